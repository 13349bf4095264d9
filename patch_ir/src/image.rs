use crate::inst::{Op, PostfixFn};

/// Snapshot of the host's loaded code, as recovered at attach time.
///
/// The image is owned and mutable: rewrites replace method bodies in place so
/// the host executes the patched stream on its next call.
#[derive(Debug, Default, Clone)]
pub struct HostImage {
    pub modules: Vec<CodeModule>,
}

impl HostImage {
    pub fn module(&self, name: &str) -> Option<&CodeModule> {
        self.modules.iter().find(|m| m.name == name)
    }

    pub fn module_mut(&mut self, name: &str) -> Option<&mut CodeModule> {
        self.modules.iter_mut().find(|m| m.name == name)
    }

    pub fn module_index(&self, name: &str) -> Option<usize> {
        self.modules.iter().position(|m| m.name == name)
    }
}

/// One loaded code module (the host typically has several).
#[derive(Debug, Default, Clone)]
pub struct CodeModule {
    pub name: String,
    pub types: Vec<TypeDef>,
}

/// A compiled type: possibly namespace-qualified name, the interfaces it
/// implements, its methods, and any nested types.
#[derive(Debug, Default, Clone)]
pub struct TypeDef {
    pub name: String,
    pub interfaces: Vec<String>,
    pub methods: Vec<Method>,
    pub nested: Vec<TypeDef>,
}

impl TypeDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn implements(&self, interface: &str) -> bool {
        self.interfaces.iter().any(|i| i == interface)
    }

    /// Direct (non-nested) method lookup by name.
    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn method_mut(&mut self, name: &str) -> Option<&mut Method> {
        self.methods.iter_mut().find(|m| m.name == name)
    }

    /// Visit every method of this type and of all nested types, depth first.
    ///
    /// Mirrors the sweep order the broad patch pass relies on: a helper inside
    /// a nested type is just as likely to embed the baseline literal as the
    /// outer method that calls it.
    pub fn for_each_method_mut<F: FnMut(&str, &mut Method)>(&mut self, mut f: F) {
        let mut stack: Vec<&mut TypeDef> = vec![self];
        while let Some(ty) = stack.pop() {
            let type_name = ty.name.clone();
            for method in &mut ty.methods {
                f(&type_name, method);
            }
            for nested in &mut ty.nested {
                stack.push(nested);
            }
        }
    }

    /// Total number of methods reachable through this type, nested included.
    pub fn method_count(&self) -> usize {
        let mut count = self.methods.len();
        for nested in &self.nested {
            count += nested.method_count();
        }
        count
    }
}

/// A single compiled operation inside a type.
#[derive(Debug, Default, Clone)]
pub struct Method {
    pub name: String,
    /// Native/abstract methods expose no instruction stream and cannot be
    /// rewritten; the sweep counts them as per-method failures.
    pub native: bool,
    pub body: MethodBody,
    /// Enter/exit hooks bracket this method's execution window.
    pub context_hooked: bool,
    /// Whole-result adjustment applied to the method's return value.
    pub postfix: Option<PostfixFn>,
}

impl Method {
    pub fn new(name: impl Into<String>, ops: Vec<Op>) -> Self {
        Self {
            name: name.into(),
            body: MethodBody::new(ops),
            ..Self::default()
        }
    }

    pub fn native(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            native: true,
            ..Self::default()
        }
    }
}

/// The instruction stream of one method plus the record of which rewrite
/// tables have already been applied to it.
#[derive(Debug, Default, Clone)]
pub struct MethodBody {
    pub ops: Vec<Op>,
    applied_tables: Vec<&'static str>,
}

impl MethodBody {
    pub fn new(ops: Vec<Op>) -> Self {
        Self {
            ops,
            applied_tables: Vec::new(),
        }
    }

    pub fn has_applied(&self, table: &'static str) -> bool {
        self.applied_tables.contains(&table)
    }

    pub(crate) fn mark_applied(&mut self, table: &'static str) {
        if !self.applied_tables.contains(&table) {
            self.applied_tables.push(table);
        }
    }
}

/// Strip any namespace qualification from a type name.
pub fn short_name(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}
