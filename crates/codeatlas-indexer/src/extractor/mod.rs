//! Entity and relationship extraction from syntax trees.
//!
//! Two-pass extraction over a tree-sitter parse: the first pass
//! materializes exactly one entity per captured definition node, the
//! second resolves nesting by walking syntactic ancestors to the nearest
//! materialized container. Call sites, imports, parameters, and heritage
//! follow as further passes over the same tree. Call resolution is simple
//! name matching within the file; there is no scope or import awareness.

pub mod scheme;

use crate::scanner::Language;
use crate::IndexerError;
use codeatlas_core::{Entity, EntityKind, Extraction, Relationship, RelationshipKind};
use scheme::{grammar_for, scheme_for, Scheme};
use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};
use tree_sitter::{Node, Parser};

const ANONYMOUS: &str = "<anonymous>";
const MAX_SIGNATURE_LEN: usize = 160;

/// Extract entities and relationships from one file's content.
///
/// A tree with syntax errors is extracted best-effort. No tree at all is
/// `Unparseable`; a parse exceeding `timeout` is `ParseTimeout`. In both
/// cases the caller keeps the file's previous graph state.
pub fn extract(
    rel_path: &str,
    source: &str,
    lang: Language,
    timeout: Duration,
) -> Result<Extraction, IndexerError> {
    let scheme = scheme_for(lang);
    let mut parser = Parser::new();
    parser
        .set_language(&grammar_for(lang))
        .map_err(|e| IndexerError::Walk(format!("grammar load failed: {e}")))?;
    #[allow(deprecated)]
    parser.set_timeout_micros(timeout.as_micros() as u64);

    let started = Instant::now();
    let tree = match parser.parse(source, None) {
        Some(tree) => tree,
        None if started.elapsed() >= timeout => {
            return Err(IndexerError::ParseTimeout {
                path: Path::new(rel_path).to_path_buf(),
            })
        }
        None => {
            return Err(IndexerError::Unparseable {
                path: Path::new(rel_path).to_path_buf(),
            })
        }
    };

    let root = tree.root_node();
    let mut cx = Extractor {
        rel_path,
        source,
        scheme,
        root,
        entities: Vec::new(),
        by_node: HashMap::new(),
        edges: Vec::new(),
    };

    cx.materialize(root);
    cx.resolve_nesting();
    cx.resolve_heritage();
    cx.extract_parameters();
    cx.extract_calls(root);
    cx.extract_imports(root);

    Ok(cx.finish())
}

/// Edge endpoint before identities are assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum End {
    File,
    Ent(usize),
}

struct Materialized<'t> {
    /// The grammar definition node, keyed for ancestor lookup.
    def_node: Node<'t>,
    entity: Entity,
}

struct Extractor<'s, 't> {
    rel_path: &'s str,
    source: &'s str,
    scheme: &'static Scheme,
    root: Node<'t>,
    entities: Vec<Materialized<'t>>,
    /// Definition node id -> entity index.
    by_node: HashMap<usize, usize>,
    edges: Vec<(End, End, RelationshipKind)>,
}

impl<'s, 't> Extractor<'s, 't> {
    // ── Pass 1: entity materialization ──────────────────────────────────

    fn materialize(&mut self, node: Node<'t>) {
        self.visit_for_definitions(node);
    }

    fn visit_for_definitions(&mut self, node: Node<'t>) {
        if let Some(def) = self.scheme.definition(node.kind()) {
            self.add_definition(node, def.kind, def.name_field);
        } else if let Some(def) = self.scheme.typed_definition(node.kind()) {
            if let Some(type_node) = node.child_by_field_name(def.type_field) {
                if let Some((_, kind)) = def
                    .mappings
                    .iter()
                    .find(|(type_kind, _)| *type_kind == type_node.kind())
                {
                    self.add_definition(node, *kind, "name");
                }
            }
        } else if let Some(decl) = self.scheme.declarator(node.kind()) {
            self.add_variable_declarator(node, decl);
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.visit_for_definitions(child);
        }
    }

    fn add_definition(&mut self, node: Node<'t>, kind: EntityKind, name_field: &str) {
        // One entity per node; overlapping rules never double-materialize.
        if self.by_node.contains_key(&node.id()) {
            return;
        }

        // Name priority: named field on the node, then one level of
        // declarator unwrapping, then the anonymous placeholder.
        let mut resolved = node;
        let name = match node
            .child_by_field_name(name_field)
            .map(|n| self.text(n).to_string())
        {
            Some(name) if !name.is_empty() => name,
            _ => match self.declarator_name(node) {
                Some((name, declarator)) => {
                    resolved = declarator;
                    name
                }
                None => ANONYMOUS.to_string(),
            },
        };

        let mut entity = Entity::new(
            kind,
            name,
            self.rel_path,
            resolved.start_position().row + 1,
            resolved.end_position().row + 1,
        );
        if kind.is_function_like() {
            entity.is_async = has_async_marker(node);
            entity.signature = self.signature(node);
        }

        self.by_node.insert(node.id(), self.entities.len());
        self.entities.push(Materialized {
            def_node: node,
            entity,
        });
    }

    /// If `node` is the value of a declarator, return the declared name and
    /// the declarator node (whose span becomes the entity's line range).
    fn declarator_name(&self, node: Node<'t>) -> Option<(String, Node<'t>)> {
        let parent = node.parent()?;
        let decl = self.scheme.declarator(parent.kind())?;
        let value = parent.child_by_field_name(decl.value_field)?;
        if value.id() != node.id() {
            return None;
        }
        let name_node = parent.child_by_field_name(decl.name_field)?;
        let name_node = descend_to_identifier(name_node)?;
        Some((self.text(name_node).to_string(), parent))
    }

    fn add_variable_declarator(&mut self, node: Node<'t>, decl: &scheme::Declarator) {
        if self.by_node.contains_key(&node.id()) {
            return;
        }
        // When the value is itself a definition, the inner node carries the
        // declaration and takes this declarator's name via unwrapping.
        if let Some(value) = node.child_by_field_name(decl.value_field) {
            if self.scheme.definition(value.kind()).is_some() {
                return;
            }
        }
        // Local variables inside function bodies are not graph entities.
        if self.inside_function(node) {
            return;
        }
        let Some(name_node) = node
            .child_by_field_name(decl.name_field)
            .and_then(descend_to_identifier)
        else {
            return;
        };

        let mut entity = Entity::new(
            EntityKind::Variable,
            self.text(name_node).to_string(),
            self.rel_path,
            node.start_position().row + 1,
            node.end_position().row + 1,
        );
        if let Some(type_node) = node.child_by_field_name("type") {
            entity.type_name = Some(clean_type_text(self.text(type_node)));
        }

        self.by_node.insert(node.id(), self.entities.len());
        self.entities.push(Materialized {
            def_node: node,
            entity,
        });
    }

    fn inside_function(&self, node: Node<'t>) -> bool {
        let mut current = node.parent();
        while let Some(ancestor) = current {
            if let Some(def) = self.scheme.definition(ancestor.kind()) {
                if def.kind.is_function_like() {
                    return true;
                }
            }
            current = ancestor.parent();
        }
        false
    }

    // ── Pass 2: nesting resolution ──────────────────────────────────────

    /// Walk each entity's syntactic ancestors to the nearest materialized
    /// container, reclassifying functions inside class-like containers as
    /// methods, and emit DECLARES edges.
    fn resolve_nesting(&mut self) {
        let mut declares: Vec<(End, usize)> = Vec::new();

        for i in 0..self.entities.len() {
            let container = self.find_container(i);
            self.demote_unparented_method(container, i);
            declares.push((container, i));
        }

        for (container, child) in declares {
            self.edges
                .push((container, End::Ent(child), RelationshipKind::Declares));
        }
    }

    fn find_container(&mut self, i: usize) -> End {
        // Go methods attach to their receiver type, not a syntactic ancestor.
        if let Some(field) = self.scheme.receiver_field(self.entities[i].def_node.kind()) {
            if let Some(receiver) = self.entities[i].def_node.child_by_field_name(field) {
                if let Some(name) = self.receiver_type_name(receiver) {
                    if let Some(j) = self.class_like_by_name(&name) {
                        return End::Ent(j);
                    }
                }
            }
        }

        let mut current = self.entities[i].def_node.parent();
        while let Some(ancestor) = current {
            if let Some(&j) = self.by_node.get(&ancestor.id()) {
                if j != i {
                    self.reclassify_if_method(j, i);
                    if self.entities[j].entity.kind.can_contain(self.entities[i].entity.kind) {
                        return End::Ent(j);
                    }
                }
            } else if let Some(alias) = self.scheme.container_alias(ancestor.kind()) {
                // e.g. an impl block stands in for the type it names.
                if let Some(type_node) = ancestor.child_by_field_name(alias.type_field) {
                    if let Some(name) = self.type_name_in(type_node) {
                        if let Some(j) = self.class_like_by_name(&name) {
                            self.reclassify_if_method(j, i);
                            if self.entities[j]
                                .entity
                                .kind
                                .can_contain(self.entities[i].entity.kind)
                            {
                                return End::Ent(j);
                            }
                        }
                    }
                }
                // Unresolvable impl target: the function stays file-level.
                return End::File;
            }
            current = ancestor.parent();
        }
        End::File
    }

    /// A function lexically inside a class-like container is a method.
    fn reclassify_if_method(&mut self, container: usize, child: usize) {
        if self.entities[container].entity.kind.is_class_like()
            && self.entities[child].entity.kind == EntityKind::Function
        {
            self.entities[child].entity.kind = EntityKind::Method;
        }
    }

    /// The inverse: a grammar-level method with no class-like container
    /// (an object-literal method, typically) is a plain function. Methods
    /// only ever hang off class-like parents.
    fn demote_unparented_method(&mut self, container: End, i: usize) {
        if self.entities[i].entity.kind != EntityKind::Method {
            return;
        }
        let class_like =
            matches!(container, End::Ent(j) if self.entities[j].entity.kind.is_class_like());
        if !class_like {
            self.entities[i].entity.kind = EntityKind::Function;
        }
    }

    // ── Pass 3: heritage ────────────────────────────────────────────────

    fn resolve_heritage(&mut self) {
        let mut found: Vec<(usize, usize, RelationshipKind)> = Vec::new();

        for (i, mat) in self.entities.iter().enumerate() {
            if !mat.entity.kind.is_class_like() {
                continue;
            }
            // Clause nodes sit directly under the definition or under a
            // heritage wrapper one level down.
            let mut cursor = mat.def_node.walk();
            for child in mat.def_node.children(&mut cursor) {
                self.collect_heritage_clause(i, child, &mut found);
                let mut inner = child.walk();
                for grandchild in child.children(&mut inner) {
                    self.collect_heritage_clause(i, grandchild, &mut found);
                }
            }
            if let Some(field) = self.scheme.class_superclass_field {
                if let Some(list) = mat.def_node.child_by_field_name(field) {
                    let mut cursor = list.walk();
                    for base in list.named_children(&mut cursor) {
                        if let Some(name) = self.type_name_in(base) {
                            if let Some(j) = self.class_like_by_name(&name) {
                                found.push((i, j, RelationshipKind::Extends));
                            }
                        }
                    }
                }
            }
        }

        // IMPLEMENTS from container aliases (impl Trait for Type).
        if !self.scheme.container_aliases.is_empty() {
            self.scan_alias_impls(self.root, &mut found);
        }

        for (src, dst, rel) in found {
            if src != dst {
                self.edges.push((End::Ent(src), End::Ent(dst), rel));
            }
        }
    }

    fn collect_heritage_clause(
        &self,
        owner: usize,
        node: Node<'t>,
        found: &mut Vec<(usize, usize, RelationshipKind)>,
    ) {
        let Some(clause) = self
            .scheme
            .heritage_clauses
            .iter()
            .find(|c| c.clause_kind == node.kind())
        else {
            return;
        };
        let mut cursor = node.walk();
        for target in node.named_children(&mut cursor) {
            if let Some(name) = self.type_name_in(target) {
                if let Some(j) = self.class_like_by_name(&name) {
                    found.push((owner, j, clause.rel));
                }
            }
        }
    }

    fn scan_alias_impls(
        &self,
        node: Node<'t>,
        found: &mut Vec<(usize, usize, RelationshipKind)>,
    ) {
        if let Some(alias) = self.scheme.container_alias(node.kind()) {
            if let Some(trait_field) = alias.trait_field {
                let type_idx = node
                    .child_by_field_name(alias.type_field)
                    .and_then(|n| self.type_name_in(n))
                    .and_then(|name| self.class_like_by_name(&name));
                let trait_idx = node
                    .child_by_field_name(trait_field)
                    .and_then(|n| self.type_name_in(n))
                    .and_then(|name| self.class_like_by_name(&name));
                if let (Some(t), Some(tr)) = (type_idx, trait_idx) {
                    found.push((t, tr, RelationshipKind::Implements));
                }
            }
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.scan_alias_impls(child, found);
        }
    }

    // ── Pass 4: parameters ──────────────────────────────────────────────

    fn extract_parameters(&mut self) {
        let mut new_entities: Vec<(Entity, End, Option<usize>)> = Vec::new();

        for (i, mat) in self.entities.iter().enumerate() {
            if !mat.entity.kind.is_function_like() {
                continue;
            }
            let params = mat
                .def_node
                .child_by_field_name("parameters")
                .or_else(|| mat.def_node.child_by_field_name("parameter"));
            let Some(params) = params else { continue };

            let param_nodes: Vec<Node<'t>> = if params.kind().contains("identifier") {
                // Bare single-parameter form, e.g. `x => x + 1`.
                vec![params]
            } else {
                let mut cursor = params.walk();
                params
                    .named_children(&mut cursor)
                    .filter(|n| n.kind() != "comment")
                    .collect()
            };

            for (index, param) in param_nodes.iter().enumerate() {
                let name = if param.kind().contains("identifier") {
                    Some(self.text(*param).to_string())
                } else {
                    descend_to_identifier(*param).map(|n| self.text(n).to_string())
                };
                let Some(name) = name else { continue };

                let mut entity = Entity::new(
                    EntityKind::Parameter,
                    name,
                    self.rel_path,
                    param.start_position().row + 1,
                    param.end_position().row + 1,
                );
                entity.index = Some(index);
                let type_target = param
                    .child_by_field_name("type")
                    .map(|n| clean_type_text(self.text(n)));
                if let Some(type_name) = &type_target {
                    entity.type_name = Some(type_name.clone());
                }
                let has_type = type_target.and_then(|t| self.class_like_by_name(&t));
                new_entities.push((entity, End::Ent(i), has_type));
            }
        }

        for (entity, owner, has_type) in new_entities {
            let idx = self.push_detached(entity);
            self.edges
                .push((owner, End::Ent(idx), RelationshipKind::HasParameter));
            if let Some(target) = has_type {
                self.edges
                    .push((End::Ent(idx), End::Ent(target), RelationshipKind::HasType));
            }
        }
    }

    // ── Pass 5: call sites ──────────────────────────────────────────────

    fn extract_calls(&mut self, root: Node<'t>) {
        let mut calls: Vec<(Entity, End, Option<usize>)> = Vec::new();
        self.visit_for_calls(root, &mut calls);

        for (entity, caller, callee) in calls {
            let idx = self.push_detached(entity);
            self.edges
                .push((caller, End::Ent(idx), RelationshipKind::HasCallSite));
            if let Some(callee) = callee {
                self.edges
                    .push((End::Ent(idx), End::Ent(callee), RelationshipKind::References));
                self.edges
                    .push((caller, End::Ent(callee), RelationshipKind::Calls));
            }
        }
    }

    fn visit_for_calls(&self, node: Node<'t>, out: &mut Vec<(Entity, End, Option<usize>)>) {
        if let Some(rule) = self.scheme.call(node.kind()) {
            if let Some(callee_node) = node.child_by_field_name(rule.callee_field) {
                if let Some(name) = self.callee_name(callee_node) {
                    let mut entity = Entity::new(
                        EntityKind::CallSite,
                        name.clone(),
                        self.rel_path,
                        node.start_position().row + 1,
                        node.end_position().row + 1,
                    );
                    entity.called_name = Some(name.clone());
                    let caller = self.enclosing_function(node);
                    // Name matching only; same-named functions alias.
                    let callee = self.function_like_by_name(&name);
                    out.push((entity, caller, callee));
                }
            }
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.visit_for_calls(child, out);
        }
    }

    fn callee_name(&self, node: Node<'t>) -> Option<String> {
        if let Some(field) = self.scheme.member_callee_field(node.kind()) {
            let name_node = node.child_by_field_name(field)?;
            return Some(self.text(name_node).to_string());
        }
        if node.kind().contains("identifier") {
            return Some(self.text(node).to_string());
        }
        None
    }

    fn enclosing_function(&self, node: Node<'t>) -> End {
        let mut current = node.parent();
        while let Some(ancestor) = current {
            if let Some(&j) = self.by_node.get(&ancestor.id()) {
                if self.entities[j].entity.kind.is_function_like() {
                    return End::Ent(j);
                }
            }
            current = ancestor.parent();
        }
        End::File
    }

    // ── Pass 6: imports ─────────────────────────────────────────────────

    fn extract_imports(&mut self, root: Node<'t>) {
        let mut imports: Vec<Entity> = Vec::new();
        self.visit_for_imports(root, &mut imports);
        for entity in imports {
            let idx = self.push_detached(entity);
            self.edges
                .push((End::File, End::Ent(idx), RelationshipKind::Imports));
        }
    }

    fn visit_for_imports(&self, node: Node<'t>, out: &mut Vec<Entity>) {
        if let Some(rule) = self.scheme.import(node.kind()) {
            let source_text = rule
                .source_field
                .and_then(|f| node.child_by_field_name(f))
                .map(|n| self.text(n))
                .unwrap_or_else(|| self.text(node));
            let name = source_text
                .trim()
                .trim_matches(|c| c == '"' || c == '\'' || c == '`')
                .lines()
                .next()
                .unwrap_or(ANONYMOUS)
                .trim_end_matches(';')
                .to_string();
            out.push(Entity::new(
                EntityKind::Import,
                name,
                self.rel_path,
                node.start_position().row + 1,
                node.end_position().row + 1,
            ));
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.visit_for_imports(child, out);
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────────

    fn text(&self, node: Node<'t>) -> &'s str {
        node.utf8_text(self.source.as_bytes()).unwrap_or("")
    }

    fn signature(&self, node: Node<'t>) -> Option<String> {
        let end = node
            .child_by_field_name("body")
            .map(|b| b.start_byte())
            .unwrap_or_else(|| node.end_byte());
        let raw = self.source.get(node.start_byte()..end)?;
        let collapsed: String = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        let trimmed = collapsed.trim().trim_end_matches('{').trim();
        if trimmed.is_empty() {
            return None;
        }
        let mut sig = trimmed.to_string();
        if sig.len() > MAX_SIGNATURE_LEN {
            sig.truncate(MAX_SIGNATURE_LEN);
        }
        Some(sig)
    }

    /// Name of the type referenced by a node, stripping pointers, generics,
    /// and receiver wrappers down to the first identifier.
    fn type_name_in(&self, node: Node<'t>) -> Option<String> {
        if node.kind().contains("identifier") {
            return Some(self.text(node).to_string());
        }
        let target = descend_to_identifier(node)?;
        Some(self.text(target).to_string())
    }

    /// Type named by a method receiver, e.g. `(e *Engine)` resolves to
    /// `Engine`. The receiver's binding name is skipped in favor of its
    /// type field.
    fn receiver_type_name(&self, receiver: Node<'t>) -> Option<String> {
        let param = if receiver.kind() == "parameter_list" {
            receiver.named_child(0)?
        } else {
            receiver
        };
        let ty = param.child_by_field_name("type").unwrap_or(param);
        self.type_name_in(ty)
    }

    fn class_like_by_name(&self, name: &str) -> Option<usize> {
        self.entities
            .iter()
            .position(|m| m.entity.kind.is_class_like() && m.entity.name == name)
    }

    fn function_like_by_name(&self, name: &str) -> Option<usize> {
        self.entities
            .iter()
            .position(|m| m.entity.kind.is_function_like() && m.entity.name == name)
    }

    /// Append an entity that has no definition node of its own
    /// (parameters, call sites, imports). The tree root stands in as its
    /// node; these entities are never looked up by node id.
    fn push_detached(&mut self, entity: Entity) -> usize {
        let idx = self.entities.len();
        self.entities.push(Materialized {
            def_node: self.root,
            entity,
        });
        idx
    }

    fn finish(self) -> Extraction {
        let identities: Vec<String> = self
            .entities
            .iter()
            .map(|m| m.entity.identity())
            .collect();
        let resolve = |end: End| -> String {
            match end {
                End::File => self.rel_path.to_string(),
                End::Ent(i) => identities[i].clone(),
            }
        };
        let relationships = self
            .edges
            .iter()
            .map(|(from, to, rel)| Relationship::new(resolve(*from), resolve(*to), *rel))
            .collect();
        Extraction {
            entities: self.entities.into_iter().map(|m| m.entity).collect(),
            relationships,
        }
    }
}

/// First identifier-like descendant, depth-first.
fn descend_to_identifier(node: Node<'_>) -> Option<Node<'_>> {
    if node.kind().contains("identifier") {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
    for child in children {
        if let Some(found) = descend_to_identifier(child) {
            return Some(found);
        }
    }
    None
}

/// Whether a definition node carries an `async` marker, directly or inside
/// a modifier wrapper.
fn has_async_marker(node: Node<'_>) -> bool {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "async" {
            return true;
        }
        if child.kind().contains("modifiers") {
            let mut inner = child.walk();
            for grandchild in child.children(&mut inner) {
                if grandchild.kind() == "async" {
                    return true;
                }
            }
        }
    }
    false
}

fn clean_type_text(raw: &str) -> String {
    raw.trim()
        .trim_start_matches(':')
        .trim()
        .trim_start_matches('*')
        .trim_start_matches('&')
        .trim()
        .to_string()
}
