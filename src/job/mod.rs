use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use crate::foundation::error::{CompressError, CompressResult};

mod compressor;

pub use compressor::{CompressReport, Compressor, JobHandle};

/// Input path plus the output path derived from it.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct TranscodeJob {
    pub input: PathBuf,
    pub output: PathBuf,
}

impl TranscodeJob {
    /// `<dir>/<stem>.<ext>` becomes `<dir>/<stem><suffix>.<ext>`. Inputs without an extension
    /// get `<stem><suffix>`.
    pub fn for_input(input: impl Into<PathBuf>, suffix: &str) -> CompressResult<Self> {
        let input = input.into();
        let output = output_path(&input, suffix)?;
        Ok(Self { input, output })
    }
}

fn output_path(input: &Path, suffix: &str) -> CompressResult<PathBuf> {
    let stem = input.file_stem().ok_or_else(|| {
        CompressError::validation(format!("input '{}' has no file name", input.display()))
    })?;

    let mut name = OsString::from(stem);
    name.push(suffix);
    if let Some(ext) = input.extension() {
        name.push(".");
        name.push(ext);
    }
    Ok(input.with_file_name(name))
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Idle,
    Running {
        input: PathBuf,
    },
    Succeeded {
        output: PathBuf,
    },
    Failed {
        reason: String,
    },
}

impl JobStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }
}
