//! Creator post API: models, page parsing and pagination.

mod paginator;
mod source;

pub use paginator::{paginate, PageError, PageSource, PaginationConfig, Pagination, StopReason};
pub use source::{fetch_creator_name, ApiPageSource};

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;

/// A file reference inside a post. The API sends `{}` for posts without a
/// main file, so both fields are optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Attachment {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Post {
    #[serde(deserialize_with = "crate::utils::string_or_number")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub file: Option<Attachment>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// One remote file discovered in a creator's posts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub post_id: String,
    pub remote_path: String,
    pub file_name: String,
}

/// Parse a posts page: either a bare array or an object with a `posts` array.
///
/// Individual posts that do not deserialize are skipped with a warning.
pub fn parse_posts(value: Value) -> Result<Vec<Post>, String> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("posts") {
            Some(Value::Array(items)) => items,
            _ => return Err("object response without a posts array".to_string()),
        },
        other => return Err(format!("unexpected JSON type: {}", json_type(&other))),
    };

    let mut posts = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<Post>(item) {
            Ok(post) => posts.push(post),
            Err(e) => tracing::warn!("Skipping malformed post: {}", e),
        }
    }
    Ok(posts)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Flatten every post's main file and attachments, dropping references
/// without a path and repeats of the same remote path.
pub fn collect_files(posts: &[Post]) -> Vec<RemoteFile> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();

    for post in posts {
        for attachment in post.file.iter().chain(post.attachments.iter()) {
            let Some(path) = attachment.path.as_deref().filter(|p| !p.is_empty()) else {
                continue;
            };
            if !seen.insert(path.to_string()) {
                continue;
            }
            let file_name = attachment
                .name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| path.rsplit('/').next().unwrap_or(path).to_string());
            files.push(RemoteFile {
                post_id: post.id.clone(),
                remote_path: path.to_string(),
                file_name,
            });
        }
    }

    files
}
