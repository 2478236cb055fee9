use serde::{Deserialize, Serialize};

/// Lifecycle of a download transfer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Idle,
    Streaming,
    Assembling,
    Complete,
    Failed,
}

/// How chunks are pulled from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeliveryMode {
    /// One chunk at a time; the next request follows each receipt.
    Sequential,
    /// Batches of chunks requested together so range reads overlap.
    ParallelBatched,
}

/// A file selected through the host's picker dialog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileHandle {
    pub name: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub last_modified: i64,
}

/// An extension filter for the picker dialog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogFilter {
    pub description: String,
    pub extensions: Vec<String>,
}

/// Options for an open-file dialog request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogOptions {
    #[serde(default)]
    pub multiple: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<DialogFilter>,
}

fn is_zero_i64(v: &i64) -> bool {
    *v == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_state_camel_case() {
        let json = serde_json::to_string(&SessionState::Streaming).unwrap();
        assert_eq!(json, "\"streaming\"");
    }

    #[test]
    fn delivery_mode_roundtrip() {
        let json = serde_json::to_string(&DeliveryMode::ParallelBatched).unwrap();
        assert_eq!(json, "\"parallelBatched\"");
        let parsed: DeliveryMode = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, DeliveryMode::ParallelBatched);
    }

    #[test]
    fn file_handle_omits_zero_mtime() {
        let handle = FileHandle {
            name: "scan.ply".into(),
            size: 1024,
            last_modified: 0,
        };
        let json = serde_json::to_string(&handle).unwrap();
        assert!(!json.contains("lastModified"));
    }

    #[test]
    fn dialog_options_default_parses_empty_object() {
        let opts: DialogOptions = serde_json::from_str("{}").unwrap();
        assert!(!opts.multiple);
        assert!(opts.filters.is_empty());
    }
}
