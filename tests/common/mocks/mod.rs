//! Stand-ins for the extraction tool.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Mutex;

use rusty_resolver::ResolverResult;
use rusty_resolver::utils::ytdlp::{ExtractionTool, ToolInvocation, ToolMode, ToolOutput};

type Script = Box<dyn Fn(&ToolInvocation) -> ToolOutput + Send + Sync>;

/// Answers every invocation through a script and records what it was asked.
///
/// Successful downloads leave a file behind at the rendered output template, like
/// the real tool does.
pub struct ScriptedTool {
    script: Script,
    invocations: Mutex<Vec<ToolInvocation>>,
    download_ext: String,
}

impl ScriptedTool {
    pub fn new(script: impl Fn(&ToolInvocation) -> ToolOutput + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            invocations: Mutex::new(Vec::new()),
            download_ext: "m4a".to_string(),
        }
    }

    /// Extension written for downloads whose template leaves it to the tool.
    pub fn with_download_ext(mut self, ext: &str) -> Self {
        self.download_ext = ext.to_string();
        self
    }

    pub fn invocations(&self) -> Vec<ToolInvocation> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&ToolInvocation) -> bool) -> usize {
        self.invocations().iter().filter(|inv| pred(inv)).count()
    }

    pub fn downloads(&self) -> usize {
        self.count(|inv| matches!(inv.mode, ToolMode::Download { .. }))
    }

    fn materialize(&self, invocation: &ToolInvocation) {
        let Some(template) = &invocation.output_template else {
            return;
        };
        let ext = match &invocation.mode {
            ToolMode::Download {
                merge_output_format: Some(container),
                ..
            } => container.clone(),
            ToolMode::Download {
                extract_audio: Some(extraction),
                ..
            } => extraction.codec.clone(),
            _ => self.download_ext.clone(),
        };
        let path = PathBuf::from(
            template
                .replace("%(id)s", super::fixtures::VIDEO_ID)
                .replace("%(ext)s", &ext)
                .replace("%%", "%"),
        );
        std::fs::write(path, b"media").unwrap();
    }
}

#[async_trait]
impl ExtractionTool for ScriptedTool {
    async fn run(&self, invocation: ToolInvocation) -> ResolverResult<ToolOutput> {
        self.invocations.lock().unwrap().push(invocation.clone());
        let output = (self.script)(&invocation);

        if output.success && matches!(invocation.mode, ToolMode::Download { .. }) {
            self.materialize(&invocation);
        }
        Ok(output)
    }
}

pub fn ok(stdout: impl Into<String>) -> ToolOutput {
    ToolOutput {
        success: true,
        stdout: stdout.into(),
        stderr: String::new(),
    }
}

pub fn failed(stderr: &str) -> ToolOutput {
    ToolOutput {
        success: false,
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}
