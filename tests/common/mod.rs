//! Common test utilities, fixtures, and mocks shared by the integration suites.

#![allow(dead_code)]

pub mod fixtures;
pub mod mocks;

use std::sync::{Arc, Once};
use tempfile::TempDir;
use tracing::Level;

use rusty_resolver::audio_sources::ResolveOptions;
use rusty_resolver::audio_sources::provider_chain::ProviderChain;
use rusty_resolver::audio_sources::track_metadata::YtDlpLookup;
use rusty_resolver::utils::credentials::{CredentialRotator, FileAuditSink};
use rusty_resolver::utils::extractor::ExtractionExecutor;
use rusty_resolver::ResolutionPolicy;

use mocks::ScriptedTool;

static INIT: Once = Once::new();

/// Installs a test-writer subscriber once per test binary.
pub fn init() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .with_test_writer()
            .init();
    });
}

/// Throwaway credential and download directories for one test.
pub struct Sandbox {
    pub cookies: TempDir,
    pub downloads: TempDir,
}

impl Sandbox {
    /// A sandbox holding `accounts` credential files.
    pub fn with_accounts(accounts: usize) -> Self {
        let cookies = TempDir::new().expect("cookies dir");
        for i in 0..accounts {
            std::fs::write(cookies.path().join(format!("account{}.txt", i)), "# Netscape HTTP Cookie File\n")
                .expect("credential file");
        }
        Self {
            cookies,
            downloads: TempDir::new().expect("downloads dir"),
        }
    }

    pub fn audit_log(&self) -> std::path::PathBuf {
        self.cookies.path().join("logs.csv")
    }

    /// Policy wired to `chain` and `tool`, the same way the binary wires production parts.
    pub fn policy(&self, chain: ProviderChain, tool: Arc<ScriptedTool>) -> ResolutionPolicy {
        let credentials = Arc::new(CredentialRotator::new(
            self.cookies.path(),
            Arc::new(FileAuditSink::new(self.audit_log())),
        ));
        let executor = Arc::new(ExtractionExecutor::new(tool, credentials, self.downloads.path(), 2));
        ResolutionPolicy::new(chain, Arc::new(YtDlpLookup::new(executor.clone())), executor)
    }
}

/// Provider options with a short poll interval, for tests that don't measure timing.
pub fn fast_options() -> ResolveOptions {
    ResolveOptions {
        timeout: std::time::Duration::from_secs(5),
        poll_interval: std::time::Duration::from_millis(50),
        ..Default::default()
    }
}
