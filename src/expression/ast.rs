//! Parse tree for templates and the expressions embedded in them

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Source location span for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Span {
    /// Start byte offset
    pub start: usize,
    /// End byte offset
    pub end: usize,
    /// Start line (0-indexed)
    pub start_line: usize,
    /// Start column (0-indexed)
    pub start_col: usize,
    /// End line (0-indexed)
    pub end_line: usize,
    /// End column (0-indexed)
    pub end_col: usize,
}

impl Span {
    pub fn new(
        start: usize,
        end: usize,
        start_line: usize,
        start_col: usize,
        end_line: usize,
        end_col: usize,
    ) -> Self {
        Self {
            start,
            end,
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    /// Create a span that covers both self and other
    pub fn merge(&self, other: &Span) -> Span {
        let (start_line, start_col) = if self.start <= other.start {
            (self.start_line, self.start_col)
        } else {
            (other.start_line, other.start_col)
        };
        let (end_line, end_col) = if self.end >= other.end {
            (self.end_line, self.end_col)
        } else {
            (other.end_line, other.end_col)
        };
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }
}

fn is_default_span(span: &Span) -> bool {
    *span == Span::default()
}

/// A compiled template: literal text interleaved with expression segments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub segments: Vec<Segment>,
    #[serde(default, skip_serializing_if = "is_default_span")]
    pub span: Span,
}

impl Template {
    /// Names of every variable referenced by any expression segment
    pub fn variables(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        for segment in &self.segments {
            if let Segment::Expr { expr, .. } = segment {
                expr.collect_variables(&mut names);
            }
        }
        names
    }

    /// Names of every filter applied anywhere in the template
    pub fn filters(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        for segment in &self.segments {
            if let Segment::Expr { expr, .. } = segment {
                expr.collect_filters(&mut names);
            }
        }
        names
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Segment {
    Text {
        v: String,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Expr {
        expr: Expr,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Or,
    And,
    Lt,
    Gt,
    Eq,
    Ne,
    Ge,
    Le,
    In,
    NotIn,
    Is,
    IsNot,
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
}

impl BinaryOp {
    /// Operator as written in source, used in error messages
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Or => "or",
            BinaryOp::And => "and",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Ge => ">=",
            BinaryOp::Le => "<=",
            BinaryOp::In => "in",
            BinaryOp::NotIn => "not in",
            BinaryOp::Is => "is",
            BinaryOp::IsNot => "is not",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Mod => "%",
        }
    }
}

/// Expression AST node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Expr {
    LitNull {
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    LitBool {
        v: bool,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    LitInt {
        v: i64,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    LitFloat {
        v: f64,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    LitStr {
        v: String,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    LitList {
        elements: Vec<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    LitDict {
        entries: Vec<(String, Expr)>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Ident {
        name: String,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    /// `a[b]` and `a.b`
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Slice {
        object: Box<Expr>,
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    /// `value | name(args...)`
    Filter {
        value: Box<Expr>,
        name: String,
        args: Vec<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
}

impl Expr {
    /// Get the span of this expression
    pub fn span(&self) -> Span {
        match self {
            Expr::LitNull { span }
            | Expr::LitBool { span, .. }
            | Expr::LitInt { span, .. }
            | Expr::LitFloat { span, .. }
            | Expr::LitStr { span, .. }
            | Expr::LitList { span, .. }
            | Expr::LitDict { span, .. }
            | Expr::Ident { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Index { span, .. }
            | Expr::Slice { span, .. }
            | Expr::Filter { span, .. } => *span,
        }
    }

    fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::LitNull { .. }
            | Expr::LitBool { .. }
            | Expr::LitInt { .. }
            | Expr::LitFloat { .. }
            | Expr::LitStr { .. }
            | Expr::Ident { .. } => vec![],
            Expr::LitList { elements, .. } => elements.iter().collect(),
            Expr::LitDict { entries, .. } => entries.iter().map(|(_, v)| v).collect(),
            Expr::Unary { operand, .. } => vec![operand.as_ref()],
            Expr::Binary { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Expr::Index { object, index, .. } => vec![object.as_ref(), index.as_ref()],
            Expr::Slice {
                object,
                lower,
                upper,
                ..
            } => {
                let mut out = vec![object.as_ref()];
                out.extend(lower.as_deref());
                out.extend(upper.as_deref());
                out
            }
            Expr::Filter { value, args, .. } => {
                let mut out = vec![value.as_ref()];
                out.extend(args.iter());
                out
            }
        }
    }

    pub fn collect_variables(&self, names: &mut BTreeSet<String>) {
        if let Expr::Ident { name, .. } = self {
            names.insert(name.clone());
        }
        for child in self.children() {
            child.collect_variables(names);
        }
    }

    pub fn collect_filters(&self, names: &mut BTreeSet<String>) {
        if let Expr::Filter { name, .. } = self {
            names.insert(name.clone());
        }
        for child in self.children() {
            child.collect_filters(names);
        }
    }
}
