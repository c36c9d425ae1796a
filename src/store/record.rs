//! Backup record and its flat-file row form

use crate::error::ApiError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const ROW_FIELDS: usize = 10;

/// Everything the daemon remembers about one backup pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub original_root: String,
    /// Current reflection root; empty while its drive is unmounted
    pub reflection_root: String,
    /// Reflection path relative to its drive's mountpoint
    pub reflection_base: String,
    pub reflector_code: String,
    pub drive_label: String,
    pub change_map_code: String,
    pub mirrored: bool,
    pub last_backup: Option<DateTime<Utc>>,
    pub original_map: Vec<u8>,
    pub reflection_map: Vec<u8>,
}

impl BackupRecord {
    pub fn key(&self) -> &str {
        &self.original_root
    }

    /// True when the reflection can currently be written
    pub fn reflection_available(&self) -> bool {
        !self.reflection_root.is_empty()
    }

    pub fn to_row(&self) -> String {
        let fields = [
            escape(&self.original_root),
            escape(&self.reflection_root),
            escape(&self.reflection_base),
            escape(&self.reflector_code),
            escape(&self.drive_label),
            escape(&self.change_map_code),
            self.mirrored.to_string(),
            self.last_backup
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
            STANDARD.encode(&self.original_map),
            STANDARD.encode(&self.reflection_map),
        ];
        fields.join(",")
    }

    pub fn from_row(row: &str) -> Result<Self, ApiError> {
        let fields = split_row(row);
        if fields.len() != ROW_FIELDS {
            return Err(ApiError::MalformedInput(format!(
                "metadata row has {} fields, expected {}",
                fields.len(),
                ROW_FIELDS
            )));
        }
        let mirrored = fields[6].parse::<bool>().map_err(|_| {
            ApiError::MalformedInput(format!("invalid mirrored flag {:?}", fields[6]))
        })?;
        let last_backup = if fields[7].is_empty() {
            None
        } else {
            Some(
                DateTime::parse_from_rfc3339(&fields[7])
                    .map_err(|e| {
                        ApiError::MalformedInput(format!("invalid timestamp {:?}: {}", fields[7], e))
                    })?
                    .with_timezone(&Utc),
            )
        };
        let decode = |field: &str, what: &str| {
            STANDARD
                .decode(field.as_bytes())
                .map_err(|e| ApiError::MalformedInput(format!("invalid {} encoding: {}", what, e)))
        };
        Ok(Self {
            original_root: fields[0].clone(),
            reflection_root: fields[1].clone(),
            reflection_base: fields[2].clone(),
            reflector_code: fields[3].clone(),
            drive_label: fields[4].clone(),
            change_map_code: fields[5].clone(),
            mirrored,
            last_backup,
            original_map: decode(&fields[8], "original map")?,
            reflection_map: decode(&fields[9], "reflection map")?,
        })
    }
}

fn escape(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    for c in field.chars() {
        if c == '\\' || c == ',' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Split a row on unescaped commas, unescaping each field
fn split_row(row: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = row.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            ',' => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

#[cfg(test)]
pub(crate) fn sample(original_root: &str) -> BackupRecord {
    BackupRecord {
        original_root: original_root.to_string(),
        reflection_root: "/mnt/backup/docs".to_string(),
        reflection_base: "backup/docs".to_string(),
        reflector_code: "diff".to_string(),
        drive_label: "BACKUP".to_string(),
        change_map_code: "blake3".to_string(),
        mirrored: true,
        last_backup: None,
        original_map: vec![1, 2, 3],
        reflection_map: vec![0x02, b'|', b','],
    }
}
