//! The run-scoped controller and the per-invocation dynamic context.
//!
//! One [`Controller`] is shared by everything in a transformation run: the
//! compiled executable, the global-variable bindery, the document pool and
//! output-URI bookkeeping, and the collaborator hooks (template rules,
//! validator, message emitter, trace listener). A [`Context`] is one
//! activation of focus + bindings; it is a cheaply cloneable record — a
//! minor context is a clone that changes focus-related state only, a major
//! context additionally owns a fresh local-variable frame.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use url::Url;

use crate::bindery::Bindery;
use crate::collation::CollationRegistry;
use crate::error::{Error, ErrorCode};
use crate::event::{ComplexContentOutputter, Receiver};
use crate::executable::Executable;
use crate::instruct::Template;
use crate::location::{LocationId, SourceLocation};
use crate::model::{QName, XdmNode};
use crate::param::ParameterSet;
use crate::tree::TreeModel;
use crate::xdm::{AtomicValue, Item, Sequence};

/// Host language of the compiled package; decides repair-versus-reject
/// rules for constructed comments/PIs and duplicate-attribute policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostLanguage {
    Xslt,
    Xquery,
}

/// Node construction strategy for pull-mode constructors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstructionMode {
    Eager,
    Lazy,
}

/// Validation requested on a constructed or copied node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationMode {
    /// Keep existing type annotations.
    Preserve,
    /// Strip all type annotations.
    Strip,
    Strict,
    Lax,
    /// Validate against a named type.
    ByType(QName),
}

impl ValidationMode {
    /// Whether this mode needs the external validator.
    pub fn requires_validator(&self) -> bool {
        matches!(
            self,
            ValidationMode::Strict | ValidationMode::Lax | ValidationMode::ByType(_)
        )
    }

    /// The error code reported when validation fails in this mode.
    pub fn failure_code(&self) -> ErrorCode {
        match self {
            ValidationMode::Strict => ErrorCode::XTTE1510,
            ValidationMode::Lax => ErrorCode::XTTE1515,
            _ => ErrorCode::XTTE1540,
        }
    }
}

/// Structured failure from the external schema validator.
#[derive(Debug, Clone)]
pub struct ValidationFailure {
    pub message: String,
}

/// External schema/type validator. Given content and a target mode it
/// returns the resulting type annotation, or a structured failure the core
/// converts into a typed error.
pub trait SchemaValidator: Send + Sync {
    fn validate_element(
        &self,
        name: &QName,
        content: &str,
        mode: &ValidationMode,
    ) -> Result<Option<QName>, ValidationFailure>;

    fn validate_attribute(
        &self,
        name: &QName,
        value: &str,
        mode: &ValidationMode,
    ) -> Result<Option<QName>, ValidationFailure>;
}

/// External mode/pattern-matching engine: given one focus item and a mode,
/// pick the template rule to run. The core performs the invocation and the
/// tail-call handling.
pub trait TemplateRules<N: XdmNode>: Send + Sync {
    fn match_item(
        &self,
        item: &Item<N>,
        mode: Option<&QName>,
        controller: &Controller<N>,
    ) -> Result<Option<Arc<Template>>, Error>;
}

/// Sink for `xsl:message` output.
pub trait MessageEmitter: Send + Sync {
    fn message(&self, content: &str, terminate: bool);
}

/// Default emitter: routes messages to the tracing subscriber.
pub struct TracingMessageEmitter;

impl MessageEmitter for TracingMessageEmitter {
    fn message(&self, content: &str, terminate: bool) {
        if terminate {
            tracing::warn!(target: "xslt.message", terminate, "{content}");
        } else {
            tracing::info!(target: "xslt.message", "{content}");
        }
    }
}

/// Trace hooks fired around per-item template application.
pub trait TraceListener<N: XdmNode>: Send + Sync {
    fn start_current_item(&self, item: &Item<N>);
    fn end_current_item(&self, item: &Item<N>);
}

/// Resolves a secondary output URI to a receiver. When absent, secondary
/// results are built as trees and registered on the controller.
pub trait OutputResolver<N: XdmNode>: Send + Sync {
    fn open(&self, uri: &str) -> Result<Box<dyn Receiver<N>>, Error>;
}

/// Run-scoped shared state.
pub struct Controller<N: XdmNode> {
    executable: Arc<Executable>,
    bindery: Bindery<N>,
    tree_model: Arc<dyn TreeModel<N>>,
    collations: Arc<CollationRegistry>,
    rules: Option<Arc<dyn TemplateRules<N>>>,
    validator: Option<Arc<dyn SchemaValidator>>,
    message_emitter: Arc<dyn MessageEmitter>,
    trace: Option<Arc<dyn TraceListener<N>>>,
    output_resolver: Option<Arc<dyn OutputResolver<N>>>,
    host_language: HostLanguage,
    construction: ConstructionMode,
    recursion_limit: usize,
    base_output_uri: Option<Url>,
    supplied_params: Mutex<HashMap<QName, Sequence<N>>>,
    // Documents read as sources during this run, by absolute URI
    doc_pool: Mutex<HashMap<String, N>>,
    // Secondary output URIs already opened during this run
    written_uris: Mutex<HashSet<String>>,
    secondary_results: Mutex<HashMap<String, N>>,
}

impl<N: XdmNode> Controller<N> {
    pub fn executable(&self) -> &Arc<Executable> {
        &self.executable
    }
    pub fn bindery(&self) -> &Bindery<N> {
        &self.bindery
    }
    pub fn tree_model(&self) -> &Arc<dyn TreeModel<N>> {
        &self.tree_model
    }
    pub fn collations(&self) -> &CollationRegistry {
        &self.collations
    }
    pub fn rules(&self) -> Option<&Arc<dyn TemplateRules<N>>> {
        self.rules.as_ref()
    }
    pub fn validator(&self) -> Option<&Arc<dyn SchemaValidator>> {
        self.validator.as_ref()
    }
    pub fn message_emitter(&self) -> &Arc<dyn MessageEmitter> {
        &self.message_emitter
    }
    pub fn trace_listener(&self) -> Option<&Arc<dyn TraceListener<N>>> {
        self.trace.as_ref()
    }
    pub fn output_resolver(&self) -> Option<&Arc<dyn OutputResolver<N>>> {
        self.output_resolver.as_ref()
    }
    pub fn host_language(&self) -> HostLanguage {
        self.host_language
    }
    pub fn construction_mode(&self) -> ConstructionMode {
        self.construction
    }
    pub fn recursion_limit(&self) -> usize {
        self.recursion_limit
    }

    pub fn location(&self, id: LocationId) -> Option<SourceLocation> {
        self.executable.locations().get(id)
    }

    /// Supply the value of a global parameter. Redefining parameters resets
    /// any globals already computed so the run can be repeated.
    pub fn set_parameter(&self, name: QName, value: Sequence<N>) {
        self.supplied_params
            .lock()
            .expect("controller lock")
            .insert(name, value);
        self.bindery.reset();
    }

    pub fn supplied_param(&self, name: &QName) -> Option<Sequence<N>> {
        self.supplied_params
            .lock()
            .expect("controller lock")
            .get(name)
            .cloned()
    }

    /// Record a document read as a source, for write-after-read detection.
    pub fn add_read_document(&self, uri: &str, doc: N) {
        self.doc_pool
            .lock()
            .expect("controller lock")
            .insert(uri.to_string(), doc);
    }

    pub fn read_document(&self, uri: &str) -> Option<N> {
        self.doc_pool.lock().expect("controller lock").get(uri).cloned()
    }

    /// Resolve a result-document href against the base output URI.
    pub fn resolve_output_uri(&self, href: &str) -> Result<String, Error> {
        match &self.base_output_uri {
            Some(base) => base
                .join(href)
                .map(|u| u.to_string())
                .map_err(|e| {
                    Error::from_code(
                        ErrorCode::Unknown,
                        format!("cannot resolve output URI {href}: {e}"),
                    )
                }),
            None => Ok(href.to_string()),
        }
    }

    /// Check destination uniqueness at the moment of opening it: a URI may
    /// be written at most once per run and must not have been read as a
    /// source.
    pub fn check_output_destination(&self, uri: &str) -> Result<(), Error> {
        if self.doc_pool.lock().expect("controller lock").contains_key(uri) {
            return Err(Error::from_code(
                ErrorCode::XTDE1500,
                format!("result document URI {uri} was already read as a source"),
            ));
        }
        let mut written = self.written_uris.lock().expect("controller lock");
        if !written.insert(uri.to_string()) {
            return Err(Error::from_code(
                ErrorCode::XTDE1490,
                format!("two result documents written to {uri}"),
            ));
        }
        Ok(())
    }

    pub fn register_secondary_result(&self, uri: &str, root: N) {
        self.secondary_results
            .lock()
            .expect("controller lock")
            .insert(uri.to_string(), root);
    }

    pub fn secondary_result(&self, uri: &str) -> Option<N> {
        self.secondary_results
            .lock()
            .expect("controller lock")
            .get(uri)
            .cloned()
    }

    /// Run a named template as the entry point of a transformation,
    /// writing to `out`.
    pub fn call_template(
        self: &Arc<Self>,
        name: &QName,
        out: Box<dyn Receiver<N>>,
    ) -> Result<(), Error> {
        let template = self.executable.named_template(name).cloned().ok_or_else(|| {
            Error::from_code(ErrorCode::XTDE0040, format!("no template named {name}"))
        })?;
        let outputter = ComplexContentOutputter::new(out, true);
        let ctx = self.new_context(Box::new(outputter));
        ctx.emit(|o| o.open())?;
        let mut callee = ctx.new_major(template.slots);
        let run = template.expand(&mut callee).and_then(|tail| match tail {
            Some(tail) => crate::instruct::drive(tail, 1),
            None => Ok(()),
        });
        // The receiver is closed on both exit paths
        let closed = ctx.emit(|o| o.close());
        run.and(closed)
    }

    /// Apply template rules to a sequence as the entry point of a
    /// transformation, writing to `out`.
    pub fn apply_templates(
        self: &Arc<Self>,
        items: Sequence<N>,
        mode: Option<QName>,
        out: Box<dyn Receiver<N>>,
    ) -> Result<(), Error> {
        let outputter = ComplexContentOutputter::new(out, true);
        let mut ctx = self.new_context(Box::new(outputter));
        ctx.emit(|o| o.open())?;
        let run = crate::instruct::apply_to_items(items, mode, &mut ctx).and_then(|tail| {
            match tail {
                Some(tail) => crate::instruct::drive(tail, 1),
                None => Ok(()),
            }
        });
        let closed = ctx.emit(|o| o.close());
        run.and(closed)
    }

    /// Create the root dynamic context for a run, writing to `out`.
    pub fn new_context(self: &Arc<Self>, out: Box<dyn Receiver<N>>) -> Context<N> {
        Context {
            controller: Arc::clone(self),
            out: Rc::new(RefCell::new(out)),
            frame: Rc::new(RefCell::new(Vec::new())),
            focus: None,
            local_params: ParameterSet::empty(),
            tunnel_params: ParameterSet::empty(),
            current_mode: None,
            current_group: None,
            origin: LocationId::NONE,
            depth: 0,
        }
    }
}

/// Builder for a [`Controller`], in the usual chainable style.
pub struct ControllerBuilder<N: XdmNode> {
    executable: Arc<Executable>,
    tree_model: Arc<dyn TreeModel<N>>,
    collations: Arc<CollationRegistry>,
    rules: Option<Arc<dyn TemplateRules<N>>>,
    validator: Option<Arc<dyn SchemaValidator>>,
    message_emitter: Arc<dyn MessageEmitter>,
    trace: Option<Arc<dyn TraceListener<N>>>,
    output_resolver: Option<Arc<dyn OutputResolver<N>>>,
    host_language: HostLanguage,
    construction: ConstructionMode,
    recursion_limit: usize,
    base_output_uri: Option<Url>,
}

impl<N: XdmNode> ControllerBuilder<N> {
    pub fn new(executable: Arc<Executable>, tree_model: Arc<dyn TreeModel<N>>) -> Self {
        Self {
            executable,
            tree_model,
            collations: Arc::new(CollationRegistry::default()),
            rules: None,
            validator: None,
            message_emitter: Arc::new(TracingMessageEmitter),
            trace: None,
            output_resolver: None,
            host_language: HostLanguage::Xslt,
            construction: ConstructionMode::Eager,
            recursion_limit: 1000,
            base_output_uri: None,
        }
    }

    pub fn with_collations(mut self, reg: Arc<CollationRegistry>) -> Self {
        self.collations = reg;
        self
    }
    pub fn with_rules(mut self, rules: Arc<dyn TemplateRules<N>>) -> Self {
        self.rules = Some(rules);
        self
    }
    pub fn with_validator(mut self, v: Arc<dyn SchemaValidator>) -> Self {
        self.validator = Some(v);
        self
    }
    pub fn with_message_emitter(mut self, e: Arc<dyn MessageEmitter>) -> Self {
        self.message_emitter = e;
        self
    }
    pub fn with_trace_listener(mut self, t: Arc<dyn TraceListener<N>>) -> Self {
        self.trace = Some(t);
        self
    }
    pub fn with_output_resolver(mut self, r: Arc<dyn OutputResolver<N>>) -> Self {
        self.output_resolver = Some(r);
        self
    }
    pub fn with_host_language(mut self, h: HostLanguage) -> Self {
        self.host_language = h;
        self
    }
    pub fn with_construction_mode(mut self, c: ConstructionMode) -> Self {
        self.construction = c;
        self
    }
    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }
    pub fn with_base_output_uri(mut self, uri: &str) -> Result<Self, Error> {
        self.base_output_uri = Some(Url::parse(uri).map_err(|e| {
            Error::from_code(ErrorCode::Unknown, format!("invalid base output URI: {e}"))
        })?);
        Ok(self)
    }

    pub fn build(self) -> Arc<Controller<N>> {
        let global_slots = self.executable.global_count();
        Arc::new(Controller {
            executable: self.executable,
            bindery: Bindery::new(global_slots),
            tree_model: self.tree_model,
            collations: self.collations,
            rules: self.rules,
            validator: self.validator,
            message_emitter: self.message_emitter,
            trace: self.trace,
            output_resolver: self.output_resolver,
            host_language: self.host_language,
            construction: self.construction,
            recursion_limit: self.recursion_limit,
            base_output_uri: self.base_output_uri,
            supplied_params: Mutex::new(HashMap::new()),
            doc_pool: Mutex::new(HashMap::new()),
            written_uris: Mutex::new(HashSet::new()),
            secondary_results: Mutex::new(HashMap::new()),
        })
    }
}

/// The (current item, position, size) triple.
#[derive(Debug, Clone)]
pub struct Focus<N> {
    pub item: Item<N>,
    pub position: usize,
    pub size: usize,
}

/// Current-group state established by `for-each-group`.
#[derive(Debug)]
pub struct GroupFocus<N> {
    pub items: Sequence<N>,
    pub key: Option<AtomicValue>,
}

/// One activation of focus + bindings.
///
/// Cloning is cheap: the frame, the active receiver slot and the controller
/// are shared. `new_minor` is a plain clone; `new_major` replaces the frame
/// with a freshly sized one, so local-variable slots are owned by the
/// context that opened the stack frame and shared by reference with its
/// minor descendants.
pub struct Context<N: XdmNode> {
    controller: Arc<Controller<N>>,
    out: Rc<RefCell<Box<dyn Receiver<N>>>>,
    frame: Rc<RefCell<Vec<Sequence<N>>>>,
    focus: Option<Focus<N>>,
    local_params: Arc<ParameterSet<N>>,
    tunnel_params: Arc<ParameterSet<N>>,
    current_mode: Option<QName>,
    current_group: Option<Rc<GroupFocus<N>>>,
    origin: LocationId,
    depth: usize,
}

impl<N: XdmNode> Clone for Context<N> {
    fn clone(&self) -> Self {
        Self {
            controller: Arc::clone(&self.controller),
            out: Rc::clone(&self.out),
            frame: Rc::clone(&self.frame),
            focus: self.focus.clone(),
            local_params: Arc::clone(&self.local_params),
            tunnel_params: Arc::clone(&self.tunnel_params),
            current_mode: self.current_mode.clone(),
            current_group: self.current_group.clone(),
            origin: self.origin,
            depth: self.depth,
        }
    }
}

impl<N: XdmNode> Context<N> {
    pub fn controller(&self) -> &Arc<Controller<N>> {
        &self.controller
    }

    /// A minor context: shares this context's stack frame and receiver,
    /// ready for focus-related changes.
    pub fn new_minor(&self) -> Self {
        self.clone()
    }

    /// A major context: opens a fresh stack frame with `slots` local slots.
    pub fn new_major(&self, slots: usize) -> Self {
        let mut ctx = self.clone();
        ctx.frame = Rc::new(RefCell::new(vec![Vec::new(); slots]));
        ctx
    }

    // ---- focus ----

    pub fn focus(&self) -> Option<&Focus<N>> {
        self.focus.as_ref()
    }

    pub fn set_focus(&mut self, item: Item<N>, position: usize, size: usize) {
        self.focus = Some(Focus {
            item,
            position,
            size,
        });
    }

    pub fn current_item(&self) -> Result<&Item<N>, Error> {
        self.focus.as_ref().map(|f| &f.item).ok_or_else(|| {
            Error::from_code(ErrorCode::XPTY0004, "the context item is absent")
                .with_location(self.origin_location())
        })
    }

    // ---- local variables ----

    pub fn local_variable(&self, slot: usize) -> Sequence<N> {
        self.frame
            .borrow()
            .get(slot)
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_local_variable(&mut self, slot: usize, value: Sequence<N>) {
        let mut frame = self.frame.borrow_mut();
        if slot >= frame.len() {
            frame.resize(slot + 1, Vec::new());
        }
        frame[slot] = value;
    }

    /// Release every local slot of the current frame. Called before
    /// returning a tail-call package: the slots are no longer reachable and
    /// must not pin memory.
    pub fn clear_frame(&mut self) {
        for slot in self.frame.borrow_mut().iter_mut() {
            slot.clear();
        }
    }

    // ---- parameters ----

    pub fn local_params(&self) -> &Arc<ParameterSet<N>> {
        &self.local_params
    }
    pub fn tunnel_params(&self) -> &Arc<ParameterSet<N>> {
        &self.tunnel_params
    }
    pub fn set_local_params(&mut self, params: Arc<ParameterSet<N>>) {
        self.local_params = params;
    }
    pub fn set_tunnel_params(&mut self, params: Arc<ParameterSet<N>>) {
        self.tunnel_params = params;
    }

    // ---- mode / group ----

    pub fn current_mode(&self) -> Option<&QName> {
        self.current_mode.as_ref()
    }
    pub fn set_current_mode(&mut self, mode: Option<QName>) {
        self.current_mode = mode;
    }

    pub fn current_group(&self) -> Option<&Rc<GroupFocus<N>>> {
        self.current_group.as_ref()
    }
    pub fn set_current_group(&mut self, group: Option<Rc<GroupFocus<N>>>) {
        self.current_group = group;
    }

    // ---- origin / diagnostics ----

    pub fn origin(&self) -> LocationId {
        self.origin
    }
    pub fn set_origin(&mut self, loc: LocationId) {
        if !loc.is_none() {
            self.origin = loc;
        }
    }
    pub fn origin_location(&self) -> Option<SourceLocation> {
        self.controller.location(self.origin)
    }

    // ---- recursion guard ----

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Pin the native-nesting depth of this context. The tail-call driver
    /// rebases every package it steps so a flat chain of tail calls runs at
    /// constant depth no matter how long it gets.
    pub(crate) fn rebase_depth(&mut self, depth: usize) -> Result<(), Error> {
        self.depth = depth;
        if depth > self.controller.recursion_limit() {
            return Err(Error::from_code(
                ErrorCode::SXLM0001,
                "too many nested template calls: the stylesheet may be looping",
            )
            .with_location(self.origin_location()));
        }
        Ok(())
    }

    /// Bump the native-nesting depth, converting a practical bound overrun
    /// into a diagnostic instead of a raw stack overflow.
    pub fn enter_nested_call(&mut self) -> Result<(), Error> {
        self.depth += 1;
        if self.depth > self.controller.recursion_limit() {
            return Err(Error::from_code(
                ErrorCode::SXLM0001,
                "too many nested template calls: the stylesheet may be looping",
            )
            .with_location(self.origin_location()));
        }
        Ok(())
    }

    // ---- output ----

    /// Run `f` against the active receiver.
    pub fn emit<T>(
        &self,
        f: impl FnOnce(&mut dyn Receiver<N>) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let mut out = self.out.borrow_mut();
        f(out.as_mut())
    }

    /// Redirect output to `out` for the duration of `f`, restoring the
    /// previous receiver on every exit path.
    pub fn with_output<T>(
        &mut self,
        out: Box<dyn Receiver<N>>,
        f: impl FnOnce(&mut Self) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let previous = std::mem::replace(&mut *self.out.borrow_mut(), out);
        let result = f(self);
        *self.out.borrow_mut() = previous;
        result
    }
}
