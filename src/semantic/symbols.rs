//! Symbol and class tables built during semantic analysis and read again
//! by the code generator.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Field,
    Local,
    Param,
    Method,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub declared_type: String,
    pub kind: SymbolKind,
    /// Class the symbol belongs to.
    pub class: String,
    /// Method the symbol belongs to, `None` for fields and methods.
    pub method: Option<String>,
    /// Positional index for parameters.
    pub position: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeKey {
    pub class: String,
    pub method: Option<String>,
}

impl ScopeKey {
    pub fn class(name: impl ToString) -> Self {
        Self {
            class: name.to_string(),
            method: None,
        }
    }

    pub fn method(class: impl ToString, method: impl ToString) -> Self {
        Self {
            class: class.to_string(),
            method: Some(method.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTable {
    scopes: HashMap<ScopeKey, HashMap<String, Symbol>>,
}

impl SymbolTable {
    /// Register a symbol in its owning scope. Redeclaring a name within
    /// one scope is rejected.
    pub fn declare(&mut self, symbol: Symbol) -> Result<(), String> {
        let key = ScopeKey {
            class: symbol.class.clone(),
            method: symbol.method.clone(),
        };
        let scope = self.scopes.entry(key).or_default();
        if scope.contains_key(&symbol.name) {
            return Err(format!(
                "duplicate declaration of '{}' in {}",
                symbol.name, symbol.class
            ));
        }
        scope.insert(symbol.name.clone(), symbol);
        Ok(())
    }

    pub fn get(&self, key: &ScopeKey, name: &str) -> Option<&Symbol> {
        self.scopes.get(key)?.get(name)
    }

    /// Resolve `name` the way the language scopes it: method locals and
    /// parameters shadow class fields.
    pub fn lookup(&self, class: &str, method: Option<&str>, name: &str) -> Option<&Symbol> {
        if let Some(method) = method {
            if let Some(symbol) = self.get(&ScopeKey::method(class, method), name) {
                return Some(symbol);
            }
        }
        self.get(&ScopeKey::class(class), name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSig {
    pub name: String,
    pub return_type: String,
    pub param_types: Vec<String>,
    /// Class that declares the method (not a flattened copy).
    pub class: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    pub name: String,
    pub parent: Option<String>,
    /// `(name, declared type)` of the class's own fields.
    pub fields: Vec<(String, String)>,
    pub methods: Vec<MethodSig>,
}

/// Per-compilation inheritance graph. Built before flattening, so every
/// method is recorded under the class that actually declares it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassTable {
    classes: HashMap<String, ClassInfo>,
}

impl ClassTable {
    pub fn insert(&mut self, info: ClassInfo) {
        self.classes.insert(info.name.clone(), info);
    }

    pub fn get(&self, name: &str) -> Option<&ClassInfo> {
        self.classes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Transitive ancestor chain, nearest parent first. Guards against
    /// cycles so it is safe to call before cycle detection has run.
    pub fn ancestors(&self, name: &str) -> Vec<&str> {
        let mut chain = vec![];
        let mut current = self.get(name).and_then(|info| info.parent.as_deref());
        while let Some(parent) = current {
            if chain.contains(&parent) || parent == name {
                break;
            }
            chain.push(parent);
            current = self.get(parent).and_then(|info| info.parent.as_deref());
        }
        chain
    }

    /// Find a method on `class` or the nearest ancestor declaring it.
    pub fn resolve_method(&self, class: &str, method: &str) -> Option<&MethodSig> {
        let mut candidates = vec![class];
        candidates.extend(self.ancestors(class));
        for candidate in candidates {
            if let Some(info) = self.get(candidate) {
                if let Some(sig) = info.methods.iter().find(|sig| sig.name == method) {
                    return Some(sig);
                }
            }
        }
        None
    }

    /// Whether a field named `name` exists on `class` or an ancestor.
    pub fn resolve_field(&self, class: &str, name: &str) -> Option<&(String, String)> {
        let mut candidates = vec![class];
        candidates.extend(self.ancestors(class));
        for candidate in candidates {
            if let Some(info) = self.get(candidate) {
                if let Some(field) = info.fields.iter().find(|(field, _)| field == name) {
                    return Some(field);
                }
            }
        }
        None
    }
}
