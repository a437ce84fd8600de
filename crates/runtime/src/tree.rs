//! Arc-backed in-memory tree used for constructed results and test input.
//!
//! The runtime never builds nodes directly; node-constructing instructions
//! emit receiver events and a [`TreeNodeBuilder`] assembles the tree. The
//! [`TreeModel`] trait is the seam through which the controller obtains
//! builders, so embedders can substitute their own node implementation.

use crate::error::{Error, ErrorCode};
use crate::event::{Receiver, ReceiverProps, copy_node_events};
use crate::location::LocationId;
use crate::model::{NodeKind, QName, XdmNode};
use crate::xdm::Item;
use std::fmt;
use std::sync::{Arc, RwLock, Weak};

#[derive(Debug)]
struct Inner {
    kind: NodeKind,
    name: Option<QName>,
    value: Option<String>,
    type_annotation: Option<QName>,
    parent: RwLock<Option<Weak<Inner>>>,
    attributes: RwLock<Vec<TreeNode>>,
    namespaces: RwLock<Vec<(String, String)>>,
    children: RwLock<Vec<TreeNode>>,
}

/// A node in the built-in tree model. Identity is pointer identity.
#[derive(Clone)]
pub struct TreeNode(Arc<Inner>);

impl PartialEq for TreeNode {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for TreeNode {}
impl std::hash::Hash for TreeNode {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.0), state);
    }
}

impl fmt::Debug for TreeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeNode")
            .field("kind", &self.0.kind)
            .field("name", &self.0.name)
            .field("value", &self.0.value)
            .finish()
    }
}

impl TreeNode {
    fn new(
        kind: NodeKind,
        name: Option<QName>,
        value: Option<String>,
        type_annotation: Option<QName>,
    ) -> Self {
        TreeNode(Arc::new(Inner {
            kind,
            name,
            value,
            type_annotation,
            parent: RwLock::new(None),
            attributes: RwLock::new(Vec::new()),
            namespaces: RwLock::new(Vec::new()),
            children: RwLock::new(Vec::new()),
        }))
    }

    pub fn document() -> Self {
        Self::new(NodeKind::Document, None, None, None)
    }
    pub fn element(name: QName) -> Self {
        Self::new(NodeKind::Element, Some(name), None, None)
    }
    pub fn attribute(name: QName, value: &str) -> Self {
        Self::new(NodeKind::Attribute, Some(name), Some(value.to_string()), None)
    }
    pub fn text(value: &str) -> Self {
        Self::new(NodeKind::Text, None, Some(value.to_string()), None)
    }
    pub fn comment(value: &str) -> Self {
        Self::new(NodeKind::Comment, None, Some(value.to_string()), None)
    }
    pub fn pi(target: &str, data: &str) -> Self {
        Self::new(
            NodeKind::ProcessingInstruction,
            Some(QName::local(target)),
            Some(data.to_string()),
            None,
        )
    }

    fn set_parent(&self, parent: &TreeNode) {
        *self.0.parent.write().expect("tree lock") = Some(Arc::downgrade(&parent.0));
    }

    pub fn push_child(&self, child: TreeNode) {
        child.set_parent(self);
        self.0.children.write().expect("tree lock").push(child);
    }

    pub fn push_attribute(&self, attr: TreeNode) {
        attr.set_parent(self);
        self.0.attributes.write().expect("tree lock").push(attr);
    }

    pub fn push_namespace(&self, prefix: &str, uri: &str) {
        self.0
            .namespaces
            .write()
            .expect("tree lock")
            .push((prefix.to_string(), uri.to_string()));
    }
}

impl XdmNode for TreeNode {
    fn kind(&self) -> NodeKind {
        self.0.kind
    }
    fn name(&self) -> Option<QName> {
        self.0.name.clone()
    }
    fn string_value(&self) -> String {
        match self.0.kind {
            NodeKind::Text
            | NodeKind::Attribute
            | NodeKind::Comment
            | NodeKind::ProcessingInstruction => self.0.value.clone().unwrap_or_default(),
            NodeKind::Element | NodeKind::Document => {
                let mut out = String::new();
                fn dfs(n: &TreeNode, out: &mut String) {
                    if n.kind() == NodeKind::Text {
                        if let Some(v) = &n.0.value {
                            out.push_str(v);
                        }
                    }
                    for c in n.children() {
                        dfs(&c, out);
                    }
                }
                dfs(self, &mut out);
                out
            }
        }
    }
    fn type_annotation(&self) -> Option<QName> {
        self.0.type_annotation.clone()
    }
    fn parent(&self) -> Option<Self> {
        self.0
            .parent
            .read()
            .expect("tree lock")
            .as_ref()
            .and_then(Weak::upgrade)
            .map(TreeNode)
    }
    fn children(&self) -> Vec<Self> {
        self.0.children.read().expect("tree lock").clone()
    }
    fn attributes(&self) -> Vec<Self> {
        self.0.attributes.read().expect("tree lock").clone()
    }
    fn namespace_declarations(&self) -> Vec<(String, String)> {
        self.0.namespaces.read().expect("tree lock").clone()
    }
}

/// Builder half of the tree seam: a receiver that, once closed, yields the
/// root node it built.
pub trait TreeBuilder<N: XdmNode>: Receiver<N> {
    /// The constructed root. Errors if the event stream did not produce
    /// exactly one root.
    fn take_root(&mut self) -> Result<N, Error>;
}

/// Factory for builders and for the orphan nodes pull-mode constructors
/// produce (free-standing attributes, text, comments, PIs).
pub trait TreeModel<N: XdmNode>: Send + Sync {
    fn make_builder(&self) -> Box<dyn TreeBuilder<N>>;
    fn make_attribute(&self, name: &QName, value: &str, type_annotation: Option<&QName>) -> N;
    fn make_text(&self, value: &str) -> N;
    fn make_comment(&self, value: &str) -> N;
    fn make_pi(&self, target: &str, data: &str) -> N;
}

/// The default tree model producing [`TreeNode`] trees.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdTreeModel;

impl TreeModel<TreeNode> for StdTreeModel {
    fn make_builder(&self) -> Box<dyn TreeBuilder<TreeNode>> {
        Box::new(TreeNodeBuilder::new())
    }
    fn make_attribute(
        &self,
        name: &QName,
        value: &str,
        type_annotation: Option<&QName>,
    ) -> TreeNode {
        TreeNode(Arc::new(Inner {
            kind: NodeKind::Attribute,
            name: Some(name.clone()),
            value: Some(value.to_string()),
            type_annotation: type_annotation.cloned(),
            parent: RwLock::new(None),
            attributes: RwLock::new(Vec::new()),
            namespaces: RwLock::new(Vec::new()),
            children: RwLock::new(Vec::new()),
        }))
    }
    fn make_text(&self, value: &str) -> TreeNode {
        TreeNode::text(value)
    }
    fn make_comment(&self, value: &str) -> TreeNode {
        TreeNode::comment(value)
    }
    fn make_pi(&self, target: &str, data: &str) -> TreeNode {
        TreeNode::pi(target, data)
    }
}

/// Assembles a [`TreeNode`] tree from receiver events.
pub struct TreeNodeBuilder {
    // Stack of open containers; index 0 is the (implicit or explicit) root
    stack: Vec<TreeNode>,
    roots: Vec<TreeNode>,
}

impl TreeNodeBuilder {
    pub fn new() -> Self {
        Self {
            stack: Vec::new(),
            roots: Vec::new(),
        }
    }

    fn attach(&mut self, node: TreeNode) {
        match self.stack.last() {
            Some(parent) => parent.push_child(node),
            None => self.roots.push(node),
        }
    }
}

impl Default for TreeNodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Receiver<TreeNode> for TreeNodeBuilder {
    fn start_document(&mut self, _props: ReceiverProps) -> Result<(), Error> {
        // A nested document event inside content is transparent
        if self.stack.is_empty() {
            let doc = TreeNode::document();
            self.stack.push(doc);
        }
        Ok(())
    }

    fn end_document(&mut self) -> Result<(), Error> {
        if self.stack.len() == 1 {
            let doc = self.stack.pop().expect("open document");
            self.roots.push(doc);
        }
        Ok(())
    }

    fn start_element(
        &mut self,
        name: &QName,
        type_annotation: Option<&QName>,
        _loc: LocationId,
        _props: ReceiverProps,
    ) -> Result<(), Error> {
        let elem = TreeNode(Arc::new(Inner {
            kind: NodeKind::Element,
            name: Some(name.clone()),
            value: None,
            type_annotation: type_annotation.cloned(),
            parent: RwLock::new(None),
            attributes: RwLock::new(Vec::new()),
            namespaces: RwLock::new(Vec::new()),
            children: RwLock::new(Vec::new()),
        }));
        self.stack.push(elem);
        Ok(())
    }

    fn namespace(&mut self, prefix: &str, uri: &str, _props: ReceiverProps) -> Result<(), Error> {
        if let Some(elem) = self.stack.last() {
            elem.push_namespace(prefix, uri);
        }
        Ok(())
    }

    fn attribute(
        &mut self,
        name: &QName,
        type_annotation: Option<&QName>,
        value: &str,
        _loc: LocationId,
        _props: ReceiverProps,
    ) -> Result<(), Error> {
        match self.stack.last() {
            Some(elem) if elem.kind() == NodeKind::Element => {
                let attr = StdTreeModel.make_attribute(name, value, type_annotation);
                elem.push_attribute(attr);
                Ok(())
            }
            _ => Err(Error::from_code(
                ErrorCode::XTDE0410,
                format!("cannot write attribute {name}: no open element"),
            )),
        }
    }

    fn end_element(&mut self) -> Result<(), Error> {
        let elem = self.stack.pop().expect("open element");
        self.attach(elem);
        Ok(())
    }

    fn characters(
        &mut self,
        value: &str,
        _loc: LocationId,
        _props: ReceiverProps,
    ) -> Result<(), Error> {
        if value.is_empty() {
            return Ok(());
        }
        self.attach(TreeNode::text(value));
        Ok(())
    }

    fn comment(&mut self, value: &str, _loc: LocationId, _props: ReceiverProps) -> Result<(), Error> {
        self.attach(TreeNode::comment(value));
        Ok(())
    }

    fn processing_instruction(
        &mut self,
        target: &str,
        data: &str,
        _loc: LocationId,
        _props: ReceiverProps,
    ) -> Result<(), Error> {
        self.attach(TreeNode::pi(target, data));
        Ok(())
    }

    fn append(&mut self, item: &Item<TreeNode>, loc: LocationId) -> Result<(), Error> {
        match item {
            Item::Node(n) => copy_node_events(n, self, true, true, loc),
            Item::Atomic(a) => self.characters(&a.string_value(), loc, ReceiverProps::NONE),
        }
    }
}

impl TreeBuilder<TreeNode> for TreeNodeBuilder {
    fn take_root(&mut self) -> Result<TreeNode, Error> {
        match self.roots.len() {
            1 => Ok(self.roots.pop().expect("single root")),
            0 => Err(Error::from_code(
                ErrorCode::Unknown,
                "tree builder produced no root node",
            )),
            _ => {
                // Multiple roots: wrap them in a document
                let doc = TreeNode::document();
                for r in self.roots.drain(..) {
                    doc.push_child(r);
                }
                Ok(doc)
            }
        }
    }
}
