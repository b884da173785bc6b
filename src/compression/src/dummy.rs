use std::sync::Arc;

use bytes::Bytes;

use crate::api::{Decompressor, ReadProgress};
use crate::error::Result;

/// Stands in for a decompressor when the parser reads its descriptor itself,
/// as the PBF parser does. Produces nothing and owns nothing.
#[derive(Debug, Default)]
pub struct DummyDecompressor {
    progress: Arc<ReadProgress>,
}

impl DummyDecompressor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decompressor for DummyDecompressor {
    fn read(&mut self) -> Result<Bytes> {
        Ok(Bytes::new())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_real(&self) -> bool {
        false
    }

    fn progress(&self) -> &Arc<ReadProgress> {
        &self.progress
    }
}
