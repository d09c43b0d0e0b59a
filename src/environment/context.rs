use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::process::Command;

use crate::error::{Error, Result};

use super::search_path::{InterpreterSearchPath, SearchPathResolver};
use super::VirtualEnv;

/// Activation state threaded through a scan instead of mutating the process environment.
///
/// Holds the search path distributions are read from, the active environment and an
/// overlay of environment variables applied to child processes built with
/// [`EnvironmentContext::command`]. Each [`activate`](EnvironmentContext::activate)
/// pushes onto this state and the returned guard pops it again.
pub struct EnvironmentContext {
    resolver: Box<dyn SearchPathResolver>,
    search_path: Vec<PathBuf>,
    active: Option<VirtualEnv>,
    /// `Some` sets a variable, `None` removes it.
    overlay: BTreeMap<String, Option<OsString>>,
}

impl EnvironmentContext {
    pub fn new(resolver: impl SearchPathResolver + 'static) -> Self {
        Self {
            resolver: Box::new(resolver),
            search_path: Vec::new(),
            active: None,
            overlay: BTreeMap::new(),
        }
    }

    /// Directories visible to a scan, innermost activation first.
    pub fn search_path(&self) -> &[PathBuf] {
        &self.search_path
    }

    pub fn active_environment(&self) -> Option<&VirtualEnv> {
        self.active.as_ref()
    }

    /// Value of `key` as a child process would see it.
    pub fn var(&self, key: &str) -> Option<OsString> {
        match self.overlay.get(key) {
            Some(value) => value.clone(),
            None => std::env::var_os(key),
        }
    }

    /// A command that runs with this context's variable overlay.
    pub fn command(&self, program: impl AsRef<OsStr>) -> Command {
        let mut cmd = Command::new(program);
        for (key, value) in &self.overlay {
            match value {
                Some(value) => cmd.env(key, value),
                None => cmd.env_remove(key),
            };
        }
        cmd
    }

    /// Make `env`'s distributions visible until the returned guard is dropped.
    ///
    /// Validation and search-path resolution happen before any state changes, so a
    /// failed activation leaves the context untouched. Guards deref to the context,
    /// which is how activations nest.
    pub fn activate(&mut self, env: &VirtualEnv) -> Result<ActivationGuard<'_>> {
        let bin = env.bin_dir();
        if !bin.is_dir() {
            return Err(Error::NotADirectory(bin));
        }

        let entries = self.resolver.resolve(env)?;

        let mut path = vec![bin];
        if let Some(current) = self.var("PATH") {
            path.extend(std::env::split_paths(&current));
        }
        let path = std::env::join_paths(path)
            .map_err(|e| Error::InvalidArgument(format!("cannot extend PATH: {e}")))?;

        let frame = Frame {
            previous_len: self.search_path.len(),
            previous_active: self.active.replace(env.clone()),
            previous_vars: vec![
                self.set_var("PATH", Some(path)),
                self.set_var("VIRTUAL_ENV", None),
            ],
        };
        self.search_path.splice(0..0, entries);

        tracing::debug!(
            env = %env.root().display(),
            entries = self.search_path.len() - frame.previous_len,
            "activated environment"
        );

        Ok(ActivationGuard {
            context: self,
            environment: env.clone(),
            frame,
        })
    }

    fn set_var(&mut self, key: &str, value: Option<OsString>) -> (String, Option<Option<OsString>>) {
        let previous = self.overlay.insert(key.to_string(), value);
        (key.to_string(), previous)
    }
}

impl Default for EnvironmentContext {
    fn default() -> Self {
        Self::new(InterpreterSearchPath::new())
    }
}

impl std::fmt::Debug for EnvironmentContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentContext")
            .field("search_path", &self.search_path)
            .field("active", &self.active)
            .field("overlay", &self.overlay)
            .finish_non_exhaustive()
    }
}

/// What an activation changed, so exactly that can be put back.
#[derive(Debug)]
struct Frame {
    previous_len: usize,
    previous_active: Option<VirtualEnv>,
    /// Overlay entries before the activation; `None` when the key was not in the overlay.
    previous_vars: Vec<(String, Option<Option<OsString>>)>,
}

/// An active environment; restores the context when dropped.
#[derive(Debug)]
pub struct ActivationGuard<'a> {
    context: &'a mut EnvironmentContext,
    environment: VirtualEnv,
    frame: Frame,
}

impl ActivationGuard<'_> {
    /// The environment this guard activated.
    pub fn environment(&self) -> &VirtualEnv {
        &self.environment
    }
}

impl Deref for ActivationGuard<'_> {
    type Target = EnvironmentContext;

    fn deref(&self) -> &Self::Target {
        self.context
    }
}

impl DerefMut for ActivationGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.context
    }
}

impl Drop for ActivationGuard<'_> {
    fn drop(&mut self) {
        let ctx = &mut *self.context;

        // Entries of leaked inner guards sit in front of ours and go too.
        let added = ctx.search_path.len().saturating_sub(self.frame.previous_len);
        ctx.search_path.drain(..added);

        ctx.active = self.frame.previous_active.take();

        for (key, previous) in self.frame.previous_vars.drain(..).rev() {
            match previous {
                Some(value) => {
                    ctx.overlay.insert(key, value);
                }
                None => {
                    ctx.overlay.remove(&key);
                }
            }
        }

        tracing::debug!(env = %self.environment.root().display(), "restored environment");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::SitePackagesLayout;
    use crate::testing::fake_venv;

    #[derive(Debug, PartialEq)]
    struct Snapshot {
        search_path: Vec<PathBuf>,
        active: Option<VirtualEnv>,
        path: Option<OsString>,
        virtual_env: Option<OsString>,
    }

    fn snapshot(ctx: &EnvironmentContext) -> Snapshot {
        Snapshot {
            search_path: ctx.search_path().to_vec(),
            active: ctx.active_environment().cloned(),
            path: ctx.var("PATH"),
            virtual_env: ctx.var("VIRTUAL_ENV"),
        }
    }

    fn context() -> EnvironmentContext {
        EnvironmentContext::new(SitePackagesLayout)
    }

    #[test]
    fn test_activation_is_visible_inside_scope() {
        let dir = tempfile::tempdir().unwrap();
        let env = fake_venv(&dir.path().join(".venv"));
        let mut ctx = context();

        let guard = ctx.activate(&env).unwrap();
        assert_eq!(guard.environment(), &env);
        assert_eq!(guard.active_environment(), Some(&env));
        assert_eq!(guard.search_path().len(), 1);
        assert!(guard.var("VIRTUAL_ENV").is_none());

        let path = guard.var("PATH").unwrap();
        let first = std::env::split_paths(&path).next().unwrap();
        assert_eq!(first, env.bin_dir());
    }

    #[test]
    fn test_restores_after_normal_exit() {
        let dir = tempfile::tempdir().unwrap();
        let env = fake_venv(&dir.path().join(".venv"));
        let mut ctx = context();
        let before = snapshot(&ctx);

        {
            let _guard = ctx.activate(&env).unwrap();
        }

        assert_eq!(snapshot(&ctx), before);
    }

    #[test]
    fn test_restores_after_error() {
        fn scan(ctx: &mut EnvironmentContext, env: &VirtualEnv) -> Result<()> {
            let _guard = ctx.activate(env)?;
            Err(Error::InvalidArgument("scan failed".to_string()))
        }

        let dir = tempfile::tempdir().unwrap();
        let env = fake_venv(&dir.path().join(".venv"));
        let mut ctx = context();
        let before = snapshot(&ctx);

        assert!(scan(&mut ctx, &env).is_err());
        assert_eq!(snapshot(&ctx), before);
    }

    #[test]
    fn test_restores_after_panic() {
        let dir = tempfile::tempdir().unwrap();
        let env = fake_venv(&dir.path().join(".venv"));
        let mut ctx = context();
        let before = snapshot(&ctx);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = ctx.activate(&env).unwrap();
            panic!("scan panicked");
        }));

        assert!(result.is_err());
        assert_eq!(snapshot(&ctx), before);
    }

    #[test]
    fn test_nested_activations_restore_innermost_first() {
        let dir = tempfile::tempdir().unwrap();
        let outer_env = fake_venv(&dir.path().join("outer"));
        let inner_env = fake_venv(&dir.path().join("inner"));
        let mut ctx = context();
        let before = snapshot(&ctx);

        {
            let mut outer = ctx.activate(&outer_env).unwrap();
            let outer_state = snapshot(&outer);

            {
                let inner = outer.activate(&inner_env).unwrap();
                assert_eq!(inner.active_environment(), Some(&inner_env));
                assert_eq!(inner.search_path().len(), 2);
                assert!(inner.search_path()[0].starts_with(inner_env.root()));
                assert!(inner.search_path()[1].starts_with(outer_env.root()));
            }

            assert_eq!(snapshot(&outer), outer_state);
            assert_eq!(outer.active_environment(), Some(&outer_env));
        }

        assert_eq!(snapshot(&ctx), before);
    }

    #[test]
    fn test_leaked_inner_guard_is_undone_by_outer() {
        let dir = tempfile::tempdir().unwrap();
        let outer_env = fake_venv(&dir.path().join("outer"));
        let inner_env = fake_venv(&dir.path().join("inner"));
        let mut ctx = context();
        let before = snapshot(&ctx);

        {
            let mut outer = ctx.activate(&outer_env).unwrap();
            std::mem::forget(outer.activate(&inner_env).unwrap());
        }

        assert_eq!(snapshot(&ctx), before);
    }

    #[test]
    fn test_missing_scripts_dir_leaves_context_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let env = VirtualEnv::new(dir.path().join("not_a_directory"));
        let mut ctx = context();
        let before = snapshot(&ctx);

        let err = ctx.activate(&env).unwrap_err();
        assert!(matches!(err, Error::NotADirectory(_)));
        assert_eq!(snapshot(&ctx), before);
    }

    #[test]
    fn test_command_applies_overlay() {
        let dir = tempfile::tempdir().unwrap();
        let env = fake_venv(&dir.path().join(".venv"));
        let mut ctx = context();

        let guard = ctx.activate(&env).unwrap();
        let cmd = guard.command("python");
        let envs: Vec<_> = cmd.get_envs().collect();
        assert!(envs.contains(&(OsStr::new("VIRTUAL_ENV"), None)));
        assert!(envs
            .iter()
            .any(|(k, v)| *k == OsStr::new("PATH") && v.is_some()));
    }
}
