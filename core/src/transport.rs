//! Capabilities the search needs from the scope.

use crate::license::MISSING_FILE_MARKER;
use anyhow::Result;

/// Result of reading a file on the scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContents {
    pub exists: bool,
    pub content: String,
}

impl FileContents {
    /// Interpret the output of `cat <path>`. Empty output (a read timeout) counts as absent.
    pub fn from_cat_output(output: impl Into<String>) -> Self {
        let content = output.into();
        let exists = !content.contains(MISSING_FILE_MARKER) && !content.trim().is_empty();
        FileContents { exists, content }
    }

    pub fn is_missing(&self) -> bool {
        self.content.contains(MISSING_FILE_MARKER)
    }
}

/// Parsed reply from the SCPI relay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScpiReply {
    pub success: bool,
    pub result: String,
}

/// Shell access used to observe the scope's file system.
pub trait ShellProbe {
    fn probe(&mut self, path: &str) -> Result<FileContents>;
    fn reboot(&mut self) -> Result<()>;
}

/// Sends one SCPI command and returns the device's reply.
pub trait ScpiRelay {
    fn send_command(&mut self, command: &str) -> Result<ScpiReply>;
}
