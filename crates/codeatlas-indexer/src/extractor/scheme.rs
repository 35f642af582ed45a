//! Per-language extraction schemes.
//!
//! A scheme is a typed table mapping grammar node kinds to entity kinds
//! plus the field names and node sets the extractor needs to resolve
//! names, calls, imports, and heritage. Tables are static and shared
//! immutably across workers; compiled grammars live in a process-wide
//! registry populated once.

use crate::scanner::Language;
use codeatlas_core::{EntityKind, RelationshipKind};
use std::collections::HashMap;
use std::sync::OnceLock;

/// A grammar node kind that directly declares an entity.
#[derive(Debug, Clone, Copy)]
pub struct Definition {
    pub node_kind: &'static str,
    pub kind: EntityKind,
    /// Field holding the declared name, when present.
    pub name_field: &'static str,
}

/// A definition whose entity kind depends on the kind of a typed child,
/// e.g. Go's `type_spec` declaring either a struct or an interface.
#[derive(Debug, Clone, Copy)]
pub struct TypedDefinition {
    pub node_kind: &'static str,
    pub type_field: &'static str,
    pub mappings: &'static [(&'static str, EntityKind)],
}

/// A declarator wrapping a value. When the value is itself a definition
/// (e.g. an arrow function) the inner node takes the declarator's name;
/// otherwise the declarator materializes as a Variable.
#[derive(Debug, Clone, Copy)]
pub struct Declarator {
    pub node_kind: &'static str,
    pub name_field: &'static str,
    pub value_field: &'static str,
}

/// A call expression node and the field holding its callee.
#[derive(Debug, Clone, Copy)]
pub struct CallRule {
    pub node_kind: &'static str,
    pub callee_field: &'static str,
}

/// An import statement node and the field naming the imported source.
#[derive(Debug, Clone, Copy)]
pub struct ImportRule {
    pub node_kind: &'static str,
    pub source_field: Option<&'static str>,
}

/// A heritage clause inside a class-like definition body.
#[derive(Debug, Clone, Copy)]
pub struct HeritageClause {
    pub clause_kind: &'static str,
    pub rel: RelationshipKind,
}

/// A node that is not an entity itself but stands in for a named
/// container, e.g. a Rust `impl` block standing in for its type.
#[derive(Debug, Clone, Copy)]
pub struct ContainerAlias {
    pub node_kind: &'static str,
    pub type_field: &'static str,
    /// When set and present, emits an IMPLEMENTS edge type -> trait.
    pub trait_field: Option<&'static str>,
}

/// Extraction rules for one language.
#[derive(Debug)]
pub struct Scheme {
    pub definitions: &'static [Definition],
    pub typed_definitions: &'static [TypedDefinition],
    pub declarators: &'static [Declarator],
    pub calls: &'static [CallRule],
    /// (node kind, field) pairs resolving member access to its rightmost name.
    pub member_callees: &'static [(&'static str, &'static str)],
    pub imports: &'static [ImportRule],
    pub heritage_clauses: &'static [HeritageClause],
    /// Field on class definitions listing superclasses (Python).
    pub class_superclass_field: Option<&'static str>,
    pub container_aliases: &'static [ContainerAlias],
    /// (node kind, receiver field) pairs attaching methods to a named type (Go).
    pub method_receivers: &'static [(&'static str, &'static str)],
}

impl Scheme {
    pub fn definition(&self, node_kind: &str) -> Option<&'static Definition> {
        self.definitions.iter().find(|d| d.node_kind == node_kind)
    }

    pub fn typed_definition(&self, node_kind: &str) -> Option<&'static TypedDefinition> {
        self.typed_definitions
            .iter()
            .find(|d| d.node_kind == node_kind)
    }

    pub fn declarator(&self, node_kind: &str) -> Option<&'static Declarator> {
        self.declarators.iter().find(|d| d.node_kind == node_kind)
    }

    pub fn call(&self, node_kind: &str) -> Option<&'static CallRule> {
        self.calls.iter().find(|c| c.node_kind == node_kind)
    }

    pub fn import(&self, node_kind: &str) -> Option<&'static ImportRule> {
        self.imports.iter().find(|i| i.node_kind == node_kind)
    }

    pub fn container_alias(&self, node_kind: &str) -> Option<&'static ContainerAlias> {
        self.container_aliases
            .iter()
            .find(|a| a.node_kind == node_kind)
    }

    pub fn member_callee_field(&self, node_kind: &str) -> Option<&'static str> {
        self.member_callees
            .iter()
            .find(|(k, _)| *k == node_kind)
            .map(|(_, f)| *f)
    }

    pub fn receiver_field(&self, node_kind: &str) -> Option<&'static str> {
        self.method_receivers
            .iter()
            .find(|(k, _)| *k == node_kind)
            .map(|(_, f)| *f)
    }
}

static TYPESCRIPT: Scheme = Scheme {
    definitions: &[
        Definition { node_kind: "class_declaration", kind: EntityKind::Class, name_field: "name" },
        Definition { node_kind: "abstract_class_declaration", kind: EntityKind::Class, name_field: "name" },
        Definition { node_kind: "interface_declaration", kind: EntityKind::Interface, name_field: "name" },
        Definition { node_kind: "enum_declaration", kind: EntityKind::Enum, name_field: "name" },
        Definition { node_kind: "function_declaration", kind: EntityKind::Function, name_field: "name" },
        Definition { node_kind: "generator_function_declaration", kind: EntityKind::Function, name_field: "name" },
        Definition { node_kind: "method_definition", kind: EntityKind::Method, name_field: "name" },
        Definition { node_kind: "arrow_function", kind: EntityKind::Function, name_field: "name" },
        Definition { node_kind: "function_expression", kind: EntityKind::Function, name_field: "name" },
    ],
    typed_definitions: &[],
    declarators: &[
        Declarator { node_kind: "variable_declarator", name_field: "name", value_field: "value" },
        Declarator { node_kind: "public_field_definition", name_field: "name", value_field: "value" },
    ],
    calls: &[
        CallRule { node_kind: "call_expression", callee_field: "function" },
        CallRule { node_kind: "new_expression", callee_field: "constructor" },
    ],
    member_callees: &[("member_expression", "property")],
    imports: &[ImportRule { node_kind: "import_statement", source_field: Some("source") }],
    heritage_clauses: &[
        HeritageClause { clause_kind: "extends_clause", rel: RelationshipKind::Extends },
        HeritageClause { clause_kind: "extends_type_clause", rel: RelationshipKind::Extends },
        HeritageClause { clause_kind: "implements_clause", rel: RelationshipKind::Implements },
    ],
    class_superclass_field: None,
    container_aliases: &[],
    method_receivers: &[],
};

static RUST: Scheme = Scheme {
    definitions: &[
        Definition { node_kind: "struct_item", kind: EntityKind::Struct, name_field: "name" },
        Definition { node_kind: "enum_item", kind: EntityKind::Enum, name_field: "name" },
        Definition { node_kind: "trait_item", kind: EntityKind::Trait, name_field: "name" },
        Definition { node_kind: "function_item", kind: EntityKind::Function, name_field: "name" },
        Definition { node_kind: "function_signature_item", kind: EntityKind::Function, name_field: "name" },
    ],
    typed_definitions: &[],
    declarators: &[
        Declarator { node_kind: "const_item", name_field: "name", value_field: "value" },
        Declarator { node_kind: "static_item", name_field: "name", value_field: "value" },
    ],
    calls: &[CallRule { node_kind: "call_expression", callee_field: "function" }],
    member_callees: &[("field_expression", "field"), ("scoped_identifier", "name")],
    imports: &[ImportRule { node_kind: "use_declaration", source_field: Some("argument") }],
    heritage_clauses: &[],
    class_superclass_field: None,
    container_aliases: &[ContainerAlias {
        node_kind: "impl_item",
        type_field: "type",
        trait_field: Some("trait"),
    }],
    method_receivers: &[],
};

static PYTHON: Scheme = Scheme {
    definitions: &[
        Definition { node_kind: "class_definition", kind: EntityKind::Class, name_field: "name" },
        Definition { node_kind: "function_definition", kind: EntityKind::Function, name_field: "name" },
    ],
    typed_definitions: &[],
    declarators: &[Declarator { node_kind: "assignment", name_field: "left", value_field: "right" }],
    calls: &[CallRule { node_kind: "call", callee_field: "function" }],
    member_callees: &[("attribute", "attribute")],
    imports: &[
        ImportRule { node_kind: "import_statement", source_field: None },
        ImportRule { node_kind: "import_from_statement", source_field: Some("module_name") },
    ],
    heritage_clauses: &[],
    class_superclass_field: Some("superclasses"),
    container_aliases: &[],
    method_receivers: &[],
};

static GO: Scheme = Scheme {
    definitions: &[
        Definition { node_kind: "function_declaration", kind: EntityKind::Function, name_field: "name" },
        Definition { node_kind: "method_declaration", kind: EntityKind::Method, name_field: "name" },
        Definition { node_kind: "func_literal", kind: EntityKind::Function, name_field: "name" },
    ],
    typed_definitions: &[TypedDefinition {
        node_kind: "type_spec",
        type_field: "type",
        mappings: &[
            ("struct_type", EntityKind::Struct),
            ("interface_type", EntityKind::Interface),
        ],
    }],
    declarators: &[
        Declarator { node_kind: "const_spec", name_field: "name", value_field: "value" },
        Declarator { node_kind: "var_spec", name_field: "name", value_field: "value" },
    ],
    calls: &[CallRule { node_kind: "call_expression", callee_field: "function" }],
    member_callees: &[("selector_expression", "field")],
    imports: &[ImportRule { node_kind: "import_spec", source_field: Some("path") }],
    heritage_clauses: &[],
    class_superclass_field: None,
    container_aliases: &[],
    method_receivers: &[("method_declaration", "receiver")],
};

/// The extraction scheme for a language.
pub fn scheme_for(lang: Language) -> &'static Scheme {
    match lang {
        Language::Rust => &RUST,
        Language::TypeScript | Language::JavaScript => &TYPESCRIPT,
        Language::Python => &PYTHON,
        Language::Go => &GO,
    }
}

static GRAMMARS: OnceLock<HashMap<Language, tree_sitter::Language>> = OnceLock::new();

/// Compiled grammar for a language, loaded once per process.
pub fn grammar_for(lang: Language) -> tree_sitter::Language {
    GRAMMARS
        .get_or_init(|| Language::ALL.iter().map(|l| (*l, l.grammar())).collect())
        .get(&lang)
        .cloned()
        .unwrap_or_else(|| lang.grammar())
}
