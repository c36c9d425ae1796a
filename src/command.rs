//! Textual command grammar: `code:p1,p2,...`
//!
//! Parameters are comma separated; a literal `,` or `\` inside a parameter is
//! escaped with a backslash.

use crate::error::ApiError;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Filesystem change reported against a watched root
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    Rename,
    Write,
    Delete,
    Create,
}

impl UpdateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateKind::Rename => "rename",
            UpdateKind::Write => "write",
            UpdateKind::Delete => "delete",
            UpdateKind::Create => "create",
        }
    }
}

impl FromStr for UpdateKind {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rename" => Ok(UpdateKind::Rename),
            "write" => Ok(UpdateKind::Write),
            "delete" => Ok(UpdateKind::Delete),
            "create" => Ok(UpdateKind::Create),
            other => Err(ApiError::MalformedInput(format!(
                "unknown update subcommand {:?}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Register a backup pair; empty codes fall back to configured defaults
    NewBackup {
        original_root: PathBuf,
        reflection_root: PathBuf,
        reflector_code: String,
        change_map_code: String,
        mirrored: bool,
    },
    Backup {
        original_root: PathBuf,
    },
    Update {
        kind: UpdateKind,
        root: PathBuf,
        path: String,
        /// Target name, for renames only
        new_name: Option<String>,
        is_dir: bool,
    },
    Unbackup {
        original_root: PathBuf,
    },
    Recover {
        original_root: PathBuf,
    },
}

impl Command {
    pub fn code(&self) -> &'static str {
        match self {
            Command::NewBackup { .. } => "new-backup",
            Command::Backup { .. } => "backup",
            Command::Update { .. } => "update",
            Command::Unbackup { .. } => "unbackup",
            Command::Recover { .. } => "recover",
        }
    }

    fn params(&self) -> Vec<String> {
        let path = |p: &PathBuf| p.to_string_lossy().to_string();
        match self {
            Command::NewBackup {
                original_root,
                reflection_root,
                reflector_code,
                change_map_code,
                mirrored,
            } => vec![
                path(original_root),
                path(reflection_root),
                reflector_code.clone(),
                change_map_code.clone(),
                mirrored.to_string(),
            ],
            Command::Backup { original_root }
            | Command::Unbackup { original_root }
            | Command::Recover { original_root } => vec![path(original_root)],
            Command::Update {
                kind,
                root,
                path: rel,
                new_name,
                is_dir,
            } => {
                let mut params = vec![kind.as_str().to_string(), path(root), rel.clone()];
                if let Some(name) = new_name {
                    params.push(name.clone());
                }
                params.push(is_dir.to_string());
                params
            }
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self.params().iter().map(|p| escape(p)).collect();
        write!(f, "{}:{}", self.code(), params.join(","))
    }
}

impl FromStr for Command {
    type Err = ApiError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (code, rest) = line
            .split_once(':')
            .ok_or_else(|| ApiError::MalformedInput(format!("missing ':' in command {:?}", line)))?;
        let params = split_params(rest);
        let arity = |min: usize, max: usize| -> Result<(), ApiError> {
            if params.len() < min || params.len() > max {
                Err(ApiError::MalformedInput(format!(
                    "{} takes {}..={} parameters, got {}",
                    code,
                    min,
                    max,
                    params.len()
                )))
            } else {
                Ok(())
            }
        };
        let root = |i: usize| -> Result<PathBuf, ApiError> {
            if params[i].is_empty() {
                return Err(ApiError::MalformedInput(format!("{}: empty root path", code)));
            }
            Ok(PathBuf::from(&params[i]))
        };

        match code {
            "new-backup" => {
                arity(4, 5)?;
                Ok(Command::NewBackup {
                    original_root: root(0)?,
                    reflection_root: root(1)?,
                    reflector_code: params[2].clone(),
                    change_map_code: params[3].clone(),
                    mirrored: params
                        .get(4)
                        .map(|flag| parse_flag(flag))
                        .transpose()?
                        .unwrap_or(true),
                })
            }
            "backup" => {
                arity(1, 1)?;
                Ok(Command::Backup {
                    original_root: root(0)?,
                })
            }
            "unbackup" => {
                arity(1, 1)?;
                Ok(Command::Unbackup {
                    original_root: root(0)?,
                })
            }
            "recover" => {
                arity(1, 1)?;
                Ok(Command::Recover {
                    original_root: root(0)?,
                })
            }
            "update" => {
                arity(3, 5)?;
                let kind: UpdateKind = params[0].parse()?;
                let (new_name, flag) = match kind {
                    UpdateKind::Rename => {
                        let name = params.get(3).cloned().filter(|n| !n.is_empty()).ok_or_else(
                            || ApiError::MalformedInput("rename requires a new name".to_string()),
                        )?;
                        (Some(name), params.get(4))
                    }
                    _ => {
                        if params.len() > 4 {
                            return Err(ApiError::MalformedInput(format!(
                                "{} takes at most 4 parameters",
                                kind.as_str()
                            )));
                        }
                        (None, params.get(3))
                    }
                };
                Ok(Command::Update {
                    kind,
                    root: root(1)?,
                    path: params[2].clone(),
                    new_name,
                    is_dir: flag.map(|f| parse_flag(f)).transpose()?.unwrap_or(false),
                })
            }
            other => Err(ApiError::MalformedInput(format!(
                "unknown command code {:?}",
                other
            ))),
        }
    }
}

fn parse_flag(flag: &str) -> Result<bool, ApiError> {
    match flag {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(ApiError::MalformedInput(format!("invalid flag {:?}", other))),
    }
}

fn escape(param: &str) -> String {
    let mut out = String::with_capacity(param.len());
    for c in param.chars() {
        if c == '\\' || c == ',' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn split_params(rest: &str) -> Vec<String> {
    let mut params = Vec::new();
    let mut current = String::new();
    let mut chars = rest.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            ',' => params.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    params.push(current);
    params
}
