//! Registry of live shell sessions.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use remote_shell_core::{IdGenerator, OutboundStreams, ShellError, ShellId, ShellResult, ShellSummary};

use crate::shell::ShellSession;

/// In-memory registry owning every live shell.
///
/// Shells are created and deleted under a single write lock, so identifier
/// uniqueness and the shell limit hold across concurrent callers.
pub struct ShellRegistry {
    shells: RwLock<HashMap<ShellId, Arc<ShellSession>>>,
    ids: IdGenerator,
    max_shells: usize,
}

impl Default for ShellRegistry {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ShellRegistry {
    /// Create a registry. `max_shells == 0` means unlimited.
    #[must_use]
    pub fn new(max_shells: usize) -> Self {
        Self::with_ids(IdGenerator::new(), max_shells)
    }

    /// Create a registry drawing identifiers from `ids`.
    #[must_use]
    pub fn with_ids(ids: IdGenerator, max_shells: usize) -> Self {
        Self {
            shells: RwLock::new(HashMap::new()),
            ids,
            max_shells,
        }
    }

    /// Identifier source shared with commands.
    #[must_use]
    pub const fn ids(&self) -> &IdGenerator {
        &self.ids
    }

    /// Create a shell from a space-delimited outbound stream descriptor.
    ///
    /// # Errors
    /// `InvalidParameter` if the descriptor names no stream,
    /// `ResourceExhausted` if the shell limit is reached.
    pub fn create(&self, output_streams: &str, compressed: bool) -> ShellResult<Arc<ShellSession>> {
        let streams = OutboundStreams::parse(output_streams);
        if streams.is_empty() {
            return Err(ShellError::InvalidParameter(
                "shell must declare at least one output stream".to_string(),
            ));
        }

        let mut shells = self
            .shells
            .write()
            .map_err(|e| ShellError::Failed(e.to_string()))?;

        if self.max_shells != 0 && shells.len() >= self.max_shells {
            return Err(ShellError::ResourceExhausted(format!(
                "shell limit of {} reached",
                self.max_shells
            )));
        }

        let id = self.ids.shell_id();
        let shell = Arc::new(ShellSession::new(id.clone(), streams, compressed));
        shells.insert(id, Arc::clone(&shell));

        Ok(shell)
    }

    /// Look up a shell by exact identifier.
    ///
    /// # Errors
    /// `NotFound` for unknown identifiers.
    pub fn find(&self, id: &ShellId) -> ShellResult<Arc<ShellSession>> {
        self.shells
            .read()
            .map_err(|e| ShellError::Failed(e.to_string()))?
            .get(id)
            .cloned()
            .ok_or_else(|| ShellError::NotFound(format!("shell {id}")))
    }

    /// Remove a shell, returning it so the caller can release its command.
    ///
    /// # Errors
    /// `NotFound` for unknown identifiers.
    pub fn delete(&self, id: &ShellId) -> ShellResult<Arc<ShellSession>> {
        self.shells
            .write()
            .map_err(|e| ShellError::Failed(e.to_string()))?
            .remove(id)
            .ok_or_else(|| ShellError::NotFound(format!("shell {id}")))
    }

    /// Snapshot of every shell, oldest first.
    ///
    /// # Errors
    /// `Failed` if the registry lock is poisoned.
    pub fn list(&self) -> ShellResult<Vec<Arc<ShellSession>>> {
        let mut shells: Vec<_> = self
            .shells
            .read()
            .map_err(|e| ShellError::Failed(e.to_string()))?
            .values()
            .cloned()
            .collect();
        shells.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(shells)
    }

    /// Emit a summary of every shell, stopping at the first emission error.
    ///
    /// Each call starts from a fresh snapshot. Returns how many summaries
    /// were emitted.
    ///
    /// # Errors
    /// The first error returned by `emit`.
    pub fn enumerate<F, E>(&self, mut emit: F) -> Result<usize, E>
    where
        F: FnMut(ShellSummary) -> Result<(), E>,
        E: From<ShellError>,
    {
        let mut emitted = 0;
        for shell in self.list()? {
            emit(shell.summary())?;
            emitted += 1;
        }
        Ok(emitted)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shells.read().map_or(0, |shells| shells.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
