//! SQL fragment expressions.
//!
//! An [`Expr`] is a small tree of scalar text nodes combined with `AND` /
//! `OR`. Scalar nodes are born fully rendered: [`Expr::fmt`] substitutes
//! each `?` placeholder with the literal form of the matching argument at
//! construction time, using the same formatters as record fields.
//!
//! ```ignore
//! use pgbatch::Expr;
//!
//! let e = Expr::fmt("shop_id = ?", [123]).and("deleted_at IS NULL");
//! assert_eq!(e.to_sql(), "(shop_id = 123 AND deleted_at IS NULL)");
//! ```

use crate::value::Value;

#[derive(Clone, Debug)]
enum Node {
    Scalar(String),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
}

/// A composable SQL fragment.
#[derive(Clone, Debug, Default)]
pub struct Expr {
    root: Option<Box<Node>>,
}

impl Expr {
    /// An expression with no content yet; the first `and`/`or` argument
    /// becomes the root.
    pub fn empty() -> Expr {
        Expr { root: None }
    }

    /// A scalar fragment, taken verbatim.
    pub fn new(text: impl Into<String>) -> Expr {
        Expr {
            root: Some(Box::new(Node::Scalar(text.into()))),
        }
    }

    /// A scalar fragment with `?` placeholders.
    ///
    /// Every `?` is replaced by the SQL literal of the corresponding
    /// argument. Panics if the placeholder and argument counts differ.
    pub fn fmt<V: Into<Value>>(text: &str, args: impl IntoIterator<Item = V>) -> Expr {
        let args: Vec<Value> = args.into_iter().map(Into::into).collect();
        let placeholders = text.matches('?').count();
        assert!(
            placeholders == args.len(),
            "number of arguments should match number of ? placeholders \
             (got {} placeholders, {} arguments)",
            placeholders,
            args.len()
        );

        let mut out = String::with_capacity(text.len());
        let mut args = args.into_iter();
        for ch in text.chars() {
            if ch == '?' {
                args.next().expect("placeholder count checked above").write_sql(&mut out);
            } else {
                out.push(ch);
            }
        }
        Expr::new(out)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Combine with another fragment under `AND`. On an empty expression the
    /// argument simply becomes the root.
    pub fn and(self, other: impl Into<Expr>) -> Expr {
        self.combine(other.into(), Node::And)
    }

    /// Combine with another fragment under `OR`.
    pub fn or(self, other: impl Into<Expr>) -> Expr {
        self.combine(other.into(), Node::Or)
    }

    /// Shorthand for `self.and(Expr::fmt(text, args))`.
    pub fn and_fmt<V: Into<Value>>(self, text: &str, args: impl IntoIterator<Item = V>) -> Expr {
        self.and(Expr::fmt(text, args))
    }

    /// Shorthand for `self.or(Expr::fmt(text, args))`.
    pub fn or_fmt<V: Into<Value>>(self, text: &str, args: impl IntoIterator<Item = V>) -> Expr {
        self.or(Expr::fmt(text, args))
    }

    fn combine(self, other: Expr, join: fn(Box<Node>, Box<Node>) -> Node) -> Expr {
        match (self.root, other.root) {
            (Some(a), Some(b)) => Expr {
                root: Some(Box::new(join(a, b))),
            },
            (a, b) => Expr { root: a.or(b) },
        }
    }

    /// Append the rendered fragment. Binary nodes are parenthesized.
    pub fn write_to(&self, buf: &mut String) {
        if let Some(root) = &self.root {
            write_node(root, buf);
        }
    }

    /// Render into a fresh `String`.
    pub fn to_sql(&self) -> String {
        let mut buf = String::new();
        self.write_to(&mut buf);
        buf
    }
}

fn write_node(node: &Node, buf: &mut String) {
    match node {
        Node::Scalar(text) => buf.push_str(text),
        Node::And(a, b) => {
            buf.push('(');
            write_node(a, buf);
            buf.push_str(" AND ");
            write_node(b, buf);
            buf.push(')');
        }
        Node::Or(a, b) => {
            buf.push('(');
            write_node(a, buf);
            buf.push_str(" OR ");
            write_node(b, buf);
            buf.push(')');
        }
    }
}

impl From<&str> for Expr {
    fn from(text: &str) -> Expr {
        Expr::new(text)
    }
}

impl From<String> for Expr {
    fn from(text: String) -> Expr {
        Expr::new(text)
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_sql())
    }
}
