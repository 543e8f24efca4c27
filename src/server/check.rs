//! File-check mode: run the same pipeline over local YAML manifests.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use kube::core::DynamicObject;
use kube::core::admission::AdmissionRequest;
use serde::Deserialize;
use tracing::error;
use walkdir::WalkDir;

use crate::server::Server;

/* ============================= FILE DISCOVERY ============================= */

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yml") | Some("yaml")
    )
}

/// Resolve the positional argument into YAML files: a glob pattern, a
/// directory walked recursively, or a single file.
fn yaml_files(input: &str) -> Result<Vec<PathBuf>> {
    if input.contains('*') || input.contains('?') || input.contains('[') {
        let mut files = vec![];
        for entry in glob::glob(input).with_context(|| format!("invalid path glob {input:?}"))? {
            let path = entry.context("failed to resolve path")?;
            if is_yaml(&path) {
                files.push(path);
            }
        }
        return Ok(files);
    }

    let metadata =
        std::fs::metadata(input).with_context(|| format!("cannot stat {input}"))?;
    if !metadata.is_dir() {
        return Ok(vec![PathBuf::from(input)]);
    }

    let mut files = vec![];
    for entry in WalkDir::new(input) {
        let entry = entry.with_context(|| format!("error walking {input}"))?;
        if entry.file_type().is_file() && is_yaml(entry.path()) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/* ============================= SYNTHETIC REQUESTS ============================= */

/// Simple english pluralization, enough to map a manifest kind to its
/// resource name the way the apiserver would.
fn pluralize(kind: &str) -> String {
    let kind = kind.to_lowercase();
    if let Some(stem) = kind.strip_suffix('y') {
        format!("{stem}ies")
    } else if kind.ends_with('s') || kind.ends_with('x') {
        format!("{kind}es")
    } else {
        format!("{kind}s")
    }
}

fn split_api_version(api_version: &str) -> (&str, &str) {
    match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    }
}

/// Build a synthetic CREATE admission request for one decoded manifest
/// document. Returns `None` for documents with no kind (comments-only,
/// empty).
fn synthetic_request(document: &serde_json::Value) -> Option<AdmissionRequest<DynamicObject>> {
    let kind = document.get("kind")?.as_str()?;
    let api_version = document
        .get("apiVersion")
        .and_then(|v| v.as_str())
        .unwrap_or("v1");
    let (group, version) = split_api_version(api_version);
    let metadata = document.get("metadata");
    let name = metadata
        .and_then(|m| m.get("name"))
        .and_then(|n| n.as_str())
        .unwrap_or("");
    let namespace = metadata
        .and_then(|m| m.get("namespace"))
        .and_then(|n| n.as_str())
        .unwrap_or("");

    serde_json::from_value(serde_json::json!({
        "uid": "",
        "kind": {"group": group, "version": version, "kind": kind},
        "resource": {"group": group, "version": version, "resource": pluralize(kind)},
        "name": name,
        "namespace": namespace,
        "operation": "CREATE",
        "userInfo": {},
        "object": document,
    }))
    .ok()
}

/* ============================= CHECK ============================= */

/// Evaluate every document under `input` and print a `FAIL` line for each
/// enforced violation. Returns whether everything was allowed.
pub async fn check_path(server: &Server, input: &str) -> Result<bool> {
    let mut allowed = true;

    for path in yaml_files(input)? {
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) => {
                error!(path = %path.display(), error = %e, "error reading file");
                allowed = false;
                continue;
            }
        };

        for document in serde_yaml::Deserializer::from_str(&contents) {
            let value = match serde_yaml::Value::deserialize(document) {
                Ok(value) => value,
                Err(e) => {
                    error!(path = %path.display(), error = %e, "error validating file");
                    allowed = false;
                    continue;
                }
            };
            if value.is_null() {
                continue;
            }
            let Ok(json) = serde_json::to_value(&value) else {
                error!(path = %path.display(), "error converting document to json");
                allowed = false;
                continue;
            };
            let Some(request) = synthetic_request(&json) else {
                continue;
            };

            let name = request.name.clone();
            let verdict = server.review(&request).await;
            if !verdict.allowed {
                allowed = false;
                for line in verdict.message.lines().filter(|l| !l.is_empty()) {
                    println!("FAIL - {} - {} - {}", path.display(), name, line);
                }
            }
        }
    }

    Ok(allowed)
}

/* ============================= TESTS ============================= */
