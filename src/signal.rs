//! Signal dispositions applied once while the context starts.

use std::collections::btree_map::{self, BTreeMap};
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::{DaemonError, DaemonResult};
use crate::sys::System;

/// What the daemon does when a signal arrives.
#[derive(Clone)]
pub enum SignalAction {
    /// `SIG_IGN`.
    Ignore,
    /// `SIG_DFL`, which terminates the process for most signals.
    Default,
    /// A handler supplied by the application.
    ///
    /// It runs inside the signal handler, so it must be async-signal-safe:
    /// no allocation, no locks. Setting an atomic flag is the usual pattern.
    Handler(Arc<dyn Fn() + Send + Sync + 'static>),
}

impl SignalAction {
    pub fn handler<F>(f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        SignalAction::Handler(Arc::new(f))
    }
}

impl fmt::Debug for SignalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalAction::Ignore => f.write_str("Ignore"),
            SignalAction::Default => f.write_str("Default"),
            SignalAction::Handler(_) => f.write_str("Handler(Fn)"),
        }
    }
}

/// Mapping from signal number to the action installed for it.
#[derive(Debug, Clone)]
pub struct SignalMap {
    actions: BTreeMap<i32, SignalAction>,
}

impl Default for SignalMap {
    /// Terminal job-control signals are ignored (a daemon has no terminal)
    /// and `SIGTERM` keeps its terminating default.
    fn default() -> Self {
        let mut map = SignalMap::empty();
        map.insert(libc::SIGTSTP, SignalAction::Ignore);
        map.insert(libc::SIGTTIN, SignalAction::Ignore);
        map.insert(libc::SIGTTOU, SignalAction::Ignore);
        map.insert(libc::SIGTERM, SignalAction::Default);
        map
    }
}

impl SignalMap {
    /// A map that leaves every disposition alone.
    pub fn empty() -> Self {
        SignalMap {
            actions: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, signal: i32, action: SignalAction) -> Option<SignalAction> {
        self.actions.insert(signal, action)
    }

    pub fn remove(&mut self, signal: i32) -> Option<SignalAction> {
        self.actions.remove(&signal)
    }

    pub fn get(&self, signal: i32) -> Option<&SignalAction> {
        self.actions.get(&signal)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, i32, SignalAction> {
        self.actions.iter()
    }
}

impl FromIterator<(i32, SignalAction)> for SignalMap {
    fn from_iter<I: IntoIterator<Item = (i32, SignalAction)>>(iter: I) -> Self {
        SignalMap {
            actions: iter.into_iter().collect(),
        }
    }
}

/// Installs every entry of `map`, in ascending signal order.
pub fn install<S: System + ?Sized>(sys: &S, map: &SignalMap) -> DaemonResult<()> {
    for (&signal, action) in map.iter() {
        sys.install_signal(signal, action)
            .map_err(|source| DaemonError::Signal { signal, source })?;
        debug!(signal, ?action, "installed signal disposition");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sys::mock::{Call, MockSystem};

    #[test]
    fn default_map_ignores_terminal_signals() {
        let map = SignalMap::default();
        assert_eq!(map.len(), 4);
        for signal in [libc::SIGTSTP, libc::SIGTTIN, libc::SIGTTOU] {
            assert!(matches!(map.get(signal), Some(SignalAction::Ignore)));
        }
        assert!(matches!(map.get(libc::SIGTERM), Some(SignalAction::Default)));
    }

    #[test]
    fn install_applies_each_entry() {
        let sys = MockSystem::new();
        let map: SignalMap = [
            (libc::SIGHUP, SignalAction::handler(|| {})),
            (libc::SIGPIPE, SignalAction::Ignore),
        ]
        .into_iter()
        .collect();

        install(&sys, &map).unwrap();

        assert_eq!(
            sys.calls(),
            vec![
                Call::InstallSignal {
                    signal: libc::SIGHUP,
                    action: "handler"
                },
                Call::InstallSignal {
                    signal: libc::SIGPIPE,
                    action: "ignore"
                },
            ]
        );
    }

    #[test]
    fn empty_map_installs_nothing() {
        let sys = MockSystem::new();
        install(&sys, &SignalMap::empty()).unwrap();
        assert!(sys.calls().is_empty());
    }
}
