//! Compile-time feature reporting.
//!
//! Local embedding and PDF extraction are optional cargo features. A build that
//! asks for a missing one fails up front with a message naming the feature.

use anyhow::{Result, bail};
use serde::Serialize;

use crate::config::EmbedderChoice;

/// Optional backends compiled into this binary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub local_embedding: bool,
    pub pdf_extraction: bool,
    /// Always available; needs an API key at runtime
    pub remote_embedding: bool,
}

impl Capabilities {
    pub fn detect() -> Self {
        Self {
            local_embedding: docent_embed::local_supported(),
            pdf_extraction: docent_context::pdf_supported(),
            remote_embedding: true,
        }
    }

    /// Fail if `choice` needs a backend this binary was built without.
    pub fn require(&self, choice: EmbedderChoice) -> Result<()> {
        match choice {
            EmbedderChoice::Local if !self.local_embedding => bail!(
                "local embedding is not available in this build (rebuild with the `local-embed` feature)"
            ),
            EmbedderChoice::Remote if !self.remote_embedding => {
                bail!("remote embedding is not available in this build")
            }
            _ => Ok(()),
        }
    }

    /// One line per backend, for the start of `docent build`.
    pub fn summary_lines(&self) -> Vec<String> {
        let mark = |on: bool| if on { "available" } else { "not compiled in" };
        vec![
            format!("  Local embedding: {}", mark(self.local_embedding)),
            format!("  Remote embedding: {}", mark(self.remote_embedding)),
            format!("  PDF extraction: {}", mark(self.pdf_extraction)),
        ]
    }
}
