//! Linear tree encoding
//!
//! Preorder, stack based. Every node is written as `id,name,base64(hash),isDir`
//! followed by the terminator `)`. After a node's children the pop marker `|)`
//! closes its subtree. Children are emitted in ascending id order. Inside names,
//! `\`, `,`, `)` and `|` are escaped with a backslash.

use crate::error::TreeError;
use crate::tree::model::Tree;
use crate::tree::node::Node;
use crate::types::{Hash, NodeId, ROOT_ID};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

const TERMINATOR: char = ')';
const POP: char = '|';
const FIELD: char = ',';
const ESCAPE: char = '\\';

/// Encode a tree into its token stream
pub fn encode(tree: &Tree) -> String {
    let mut out = String::new();
    encode_node(tree, ROOT_ID, &mut out);
    out
}

fn encode_node(tree: &Tree, id: NodeId, out: &mut String) {
    let node = match tree.get(id) {
        Some(node) => node,
        None => return,
    };
    out.push_str(&node.id.to_string());
    out.push(FIELD);
    escape_into(&node.name, out);
    out.push(FIELD);
    out.push_str(&STANDARD.encode(node.hash));
    out.push(FIELD);
    out.push_str(if node.is_dir { "true" } else { "false" });
    out.push(TERMINATOR);
    for child in &node.children {
        encode_node(tree, *child, out);
    }
    out.push(POP);
    out.push(TERMINATOR);
}

fn escape_into(name: &str, out: &mut String) {
    for c in name.chars() {
        if matches!(c, ESCAPE | FIELD | TERMINATOR | POP) {
            out.push(ESCAPE);
        }
        out.push(c);
    }
}

/// Split on unescaped `sep`, keeping escape sequences intact
fn split_unescaped(input: &str, sep: char) -> Result<Vec<String>, TreeError> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        if c == ESCAPE {
            let escaped = chars
                .next()
                .ok_or_else(|| TreeError::Malformed("dangling escape".to_string()))?;
            current.push(c);
            current.push(escaped);
        } else if c == sep {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    parts.push(current);
    Ok(parts)
}

fn unescape(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        if c == ESCAPE {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn parse_node(token: &str) -> Result<Node, TreeError> {
    let fields = split_unescaped(token, FIELD)?;
    if fields.len() != 4 {
        return Err(TreeError::Malformed(format!(
            "node token has {} fields, expected 4: {:?}",
            fields.len(),
            token
        )));
    }
    let id: NodeId = fields[0]
        .parse()
        .map_err(|_| TreeError::Malformed(format!("invalid node id {:?}", fields[0])))?;
    let name = unescape(&fields[1]);
    let bytes = STANDARD
        .decode(fields[2].as_bytes())
        .map_err(|e| TreeError::Malformed(format!("invalid hash for node {}: {}", id, e)))?;
    let hash: Hash = bytes.as_slice().try_into().map_err(|_| {
        TreeError::Malformed(format!("hash for node {} has {} bytes", id, bytes.len()))
    })?;
    let is_dir = match fields[3].as_str() {
        "true" => true,
        "false" => false,
        other => {
            return Err(TreeError::Malformed(format!(
                "invalid directory flag {:?}",
                other
            )))
        }
    };
    Ok(Node::new(id, name, hash, is_dir))
}

/// Decode a token stream back into a tree
///
/// Rebuilds the arena, the path index and an id counter above every decoded id.
pub fn decode(data: &str) -> Result<Tree, TreeError> {
    let mut tokens = split_unescaped(data, TERMINATOR)?;
    // The stream ends with a terminator, leaving one empty trailing token
    if tokens.last().map(|t| t.is_empty()).unwrap_or(false) {
        tokens.pop();
    }
    let mut tokens = tokens.into_iter();

    let root_token = tokens
        .next()
        .ok_or_else(|| TreeError::Malformed("empty tree encoding".to_string()))?;
    let root = parse_node(&root_token)?;
    if root.id != ROOT_ID || !root.is_dir {
        return Err(TreeError::Malformed(format!(
            "first node must be the root directory, found id {}",
            root.id
        )));
    }
    let mut tree = Tree::new(root.name);
    if let Some(node) = tree.get_mut(ROOT_ID) {
        node.hash = root.hash;
    }

    let mut stack: Vec<NodeId> = vec![ROOT_ID];
    for token in tokens {
        if token.len() == 1 && token.starts_with(POP) {
            if stack.pop().is_none() {
                return Err(TreeError::Malformed("unbalanced pop marker".to_string()));
            }
            continue;
        }
        let parent = *stack
            .last()
            .ok_or_else(|| TreeError::Malformed("data after the root closed".to_string()))?;
        let node = parse_node(&token)?;
        let id = node.id;
        if id == ROOT_ID {
            return Err(TreeError::Malformed("root id reused below the root".to_string()));
        }
        tree.attach(parent, node)?;
        stack.push(id);
    }
    if !stack.is_empty() {
        return Err(TreeError::Malformed(format!(
            "truncated encoding: {} subtree(s) left open",
            stack.len()
        )));
    }
    Ok(tree)
}
