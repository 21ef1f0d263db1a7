//=============================================
// src/screen.rs
//=============================================
// Author: EmberWorks Contributors
// License: MIT (see LICENSE)
// Goal: EmberScript screen variable store
// Objective: Externally owned named state, readable and writable from any
//            evaluation thread; the per-screen map is the unit of locking
//=============================================

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::value::Value;

type VarMap = Arc<RwLock<HashMap<String, Value>>>;

/// Registry of screen variable maps, shared between every execution context
/// and the host. Screen and variable names are case-insensitive.
#[derive(Debug, Default)]
pub struct ScreenRegistry {
    screens: RwLock<HashMap<String, VarMap>>,
}

impl ScreenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a screen, keeping existing variables if it already exists.
    pub fn declare(&self, name: &str) {
        let key = name.to_lowercase();
        self.screens
            .write()
            .entry(key)
            .or_insert_with(|| Arc::new(RwLock::new(HashMap::new())));
    }

    pub fn has_screen(&self, name: &str) -> bool {
        self.screens.read().contains_key(&name.to_lowercase())
    }

    fn vars(&self, screen: &str) -> Option<VarMap> {
        self.screens.read().get(&screen.to_lowercase()).cloned()
    }

    pub fn get_var(&self, screen: &str, name: &str) -> Option<Value> {
        self.vars(screen)
            .and_then(|vars| vars.read().get(&name.to_lowercase()).cloned())
    }

    /// Set a screen variable, creating the screen on first use so hosts can
    /// seed state before the script declares it.
    pub fn set_var(&self, screen: &str, name: &str, value: Value) {
        let vars = match self.vars(screen) {
            Some(vars) => vars,
            None => {
                self.declare(screen);
                self.vars(screen).expect("screen just declared")
            }
        };
        vars.write().insert(name.to_lowercase(), value);
    }

    pub fn has_var(&self, screen: &str, name: &str) -> bool {
        self.vars(screen)
            .map(|vars| vars.read().contains_key(&name.to_lowercase()))
            .unwrap_or(false)
    }

    pub fn var_names(&self, screen: &str) -> Vec<String> {
        match self.vars(screen) {
            Some(vars) => {
                let mut names: Vec<String> = vars.read().keys().cloned().collect();
                names.sort();
                names
            }
            None => Vec::new(),
        }
    }

    pub fn screen_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.screens.read().keys().cloned().collect();
        names.sort();
        names
    }
}
