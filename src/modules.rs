//=============================================
// src/modules.rs
//=============================================
// Author: EmberWorks Contributors
// License: MIT (see LICENSE)
// Goal: EmberScript module resolution
// Objective: Import-path normalization, parse cache, circular-import
//            detection, and the duplicate-declaration registry
//=============================================

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use log::debug;

use crate::ast::Program;
use crate::error::{ScriptError, ScriptResult};

/// Per-root-execution import state. One resolver instance lives for one
/// root script run; independent executions get independent resolvers.
#[derive(Debug, Default)]
pub struct ModuleResolver {
    /// Parse cache keyed by normalized absolute path. Entries are shared
    /// read-only and survive until invalidated by the owning editor's save.
    cache: HashMap<PathBuf, Arc<Program>>,
    /// Files currently being resolved; used only for cycle detection and
    /// empty between resolutions.
    stack: Vec<PathBuf>,
    /// Lowercased function/screen name -> file of first declaration.
    declared: HashMap<String, PathBuf>,
    /// Units whose top-level statements already ran in this root execution.
    executed: std::collections::HashSet<PathBuf>,
}

pub type SharedResolver = Rc<RefCell<ModuleResolver>>;

impl ModuleResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedResolver {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Normalize an import path literal: make it absolute against the
    /// importing file's directory and resolve `.`/`..` lexically, so the
    /// same file always maps onto the same cache key regardless of how the
    /// path was written.
    pub fn normalize(literal: &str, base_dir: Option<&Path>) -> PathBuf {
        let raw = PathBuf::from(literal);
        let joined = if raw.is_absolute() {
            raw
        } else {
            match base_dir {
                Some(base) => base.join(raw),
                None => std::env::current_dir()
                    .unwrap_or_else(|_| PathBuf::from("."))
                    .join(raw),
            }
        };
        let mut normalized = PathBuf::new();
        for component in joined.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    if !normalized.pop() {
                        normalized.push(Component::ParentDir);
                    }
                }
                other => normalized.push(other),
            }
        }
        normalized
    }

    /// Cycle check and stack push, in that order: the check runs before the
    /// parse cache is consulted. The returned guard pops the stack when it
    /// drops, on every exit path.
    pub fn begin_import(
        resolver: &SharedResolver,
        normalized: &Path,
    ) -> ScriptResult<ImportStackGuard> {
        {
            let mut inner = resolver.borrow_mut();
            if let Some(pos) = inner.stack.iter().position(|p| p == normalized) {
                let mut chain: Vec<PathBuf> = inner.stack[pos..].to_vec();
                chain.push(normalized.to_path_buf());
                return Err(ScriptError::CircularImport { chain });
            }
            inner.stack.push(normalized.to_path_buf());
        }
        Ok(ImportStackGuard {
            resolver: Rc::clone(resolver),
        })
    }

    pub fn cached(&self, normalized: &Path) -> Option<Arc<Program>> {
        let hit = self.cache.get(normalized).cloned();
        debug!(
            "parse cache {} for {}",
            if hit.is_some() { "hit" } else { "miss" },
            normalized.display()
        );
        hit
    }

    pub fn insert(&mut self, normalized: PathBuf, program: Arc<Program>) {
        self.cache.insert(normalized, program);
    }

    /// Register every top-level function and screen declared by `program`.
    /// A lowercased name already registered under a different file is a
    /// duplicate; re-registering from the same file is a no-op.
    pub fn register_declarations(&mut self, program: &Program, file: &Path) -> ScriptResult<()> {
        for decl in program.functions() {
            self.register_name(&decl.name, file)?;
        }
        for decl in program.screens() {
            self.register_name(&decl.name, file)?;
        }
        Ok(())
    }

    fn register_name(&mut self, name: &str, file: &Path) -> ScriptResult<()> {
        let key = name.to_lowercase();
        if let Some(first) = self.declared.get(&key) {
            if first != file {
                return Err(ScriptError::DuplicateDeclaration {
                    name: key,
                    first: first.clone(),
                    second: file.to_path_buf(),
                });
            }
            return Ok(());
        }
        debug!("registering declaration '{}' from {}", key, file.display());
        self.declared.insert(key, file.to_path_buf());
        Ok(())
    }

    /// Drop the cache entry for a file the editor just saved; the next
    /// import reparses current content. This is the only externally
    /// triggered mutation the resolver accepts.
    pub fn invalidate(&mut self, path: &Path) {
        let normalized = Self::normalize(&path.to_string_lossy(), None);
        debug!("invalidating cache entry {}", normalized.display());
        self.cache.remove(&normalized);
    }

    /// Record that a unit's top-level statements are about to run. Returns
    /// false when they already did, so re-imports stay side-effect free.
    pub fn mark_executed(&mut self, normalized: &Path) -> bool {
        self.executed.insert(normalized.to_path_buf())
    }

    pub fn import_depth(&self) -> usize {
        self.stack.len()
    }

    fn pop_import(&mut self) {
        self.stack.pop();
    }
}

/// Pops the import stack when dropped so a failed resolution never leaves
/// the stack polluted for later imports.
pub struct ImportStackGuard {
    resolver: SharedResolver,
}

impl std::fmt::Debug for ImportStackGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportStackGuard").finish_non_exhaustive()
    }
}

impl Drop for ImportStackGuard {
    fn drop(&mut self) {
        self.resolver.borrow_mut().pop_import();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{FunctionDecl, Stmt};

    fn program_with_function(name: &str) -> Program {
        Program::new(vec![Stmt::FunctionDecl {
            decl: Arc::new(FunctionDecl {
                name: name.into(),
                params: vec![],
                body: vec![],
                line: 1,
            }),
        }])
    }

    #[test]
    fn normalize_resolves_dot_segments() {
        let base = Path::new("/projects/app");
        let a = ModuleResolver::normalize("lib/../lib/./util.ebs", Some(base));
        let b = ModuleResolver::normalize("lib/util.ebs", Some(base));
        assert_eq!(a, b);
        assert_eq!(a, PathBuf::from("/projects/app/lib/util.ebs"));
    }

    #[test]
    fn normalize_keeps_absolute_paths() {
        let p = ModuleResolver::normalize("/opt/scripts/a.ebs", Some(Path::new("/elsewhere")));
        assert_eq!(p, PathBuf::from("/opt/scripts/a.ebs"));
    }

    #[test]
    fn cycle_is_detected_with_full_chain() {
        let resolver = ModuleResolver::shared();
        let a = PathBuf::from("/s/a.ebs");
        let b = PathBuf::from("/s/b.ebs");
        let _ga = ModuleResolver::begin_import(&resolver, &a).unwrap();
        let _gb = ModuleResolver::begin_import(&resolver, &b).unwrap();
        let err = ModuleResolver::begin_import(&resolver, &a).expect_err("expected cycle");
        match err {
            ScriptError::CircularImport { chain } => {
                assert_eq!(chain, vec![a.clone(), b.clone(), a.clone()]);
            }
            other => panic!("expected circular import, got {:?}", other),
        }
    }

    #[test]
    fn stack_is_popped_on_guard_drop() {
        let resolver = ModuleResolver::shared();
        let a = PathBuf::from("/s/a.ebs");
        {
            let _guard = ModuleResolver::begin_import(&resolver, &a).unwrap();
            assert_eq!(resolver.borrow().import_depth(), 1);
        }
        assert_eq!(resolver.borrow().import_depth(), 0);
        // A fresh import of the same path succeeds after cleanup.
        let _guard = ModuleResolver::begin_import(&resolver, &a).unwrap();
    }

    #[test]
    fn duplicate_names_across_files_are_rejected_case_insensitively() {
        let mut resolver = ModuleResolver::new();
        let first = PathBuf::from("/s/one.ebs");
        let second = PathBuf::from("/s/two.ebs");
        resolver
            .register_declarations(&program_with_function("Foo"), &first)
            .unwrap();
        let err = resolver
            .register_declarations(&program_with_function("foo"), &second)
            .expect_err("expected duplicate");
        match err {
            ScriptError::DuplicateDeclaration { name, first: f, second: s } => {
                assert_eq!(name, "foo");
                assert_eq!(f, first);
                assert_eq!(s, second);
            }
            other => panic!("expected duplicate declaration, got {:?}", other),
        }
    }

    #[test]
    fn same_file_may_register_twice() {
        let mut resolver = ModuleResolver::new();
        let file = PathBuf::from("/s/one.ebs");
        let program = program_with_function("foo");
        resolver.register_declarations(&program, &file).unwrap();
        resolver
            .register_declarations(&program, &file)
            .expect("same-file re-registration is fine");
    }

    #[test]
    fn invalidate_drops_cache_entry() {
        let mut resolver = ModuleResolver::new();
        let key = ModuleResolver::normalize("/s/a.ebs", None);
        resolver.insert(key.clone(), Arc::new(Program::new(vec![])));
        assert!(resolver.cached(&key).is_some());
        resolver.invalidate(Path::new("/s/a.ebs"));
        assert!(resolver.cached(&key).is_none());
    }
}
