//! Typed filter trees.
//!
//! Filters arrive already parsed; this module only defines their shape and a
//! few structural queries used by the SQL compiler. The JSON encoding is
//! internally tagged on `op`, e.g.
//! `{"op":"compare","cmp":"eq","left":{"property":"name"},"right":{"literal":"x"}}`.

use crate::geometry::Geometry;
use crate::temporal::TemporalLiteral;
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Scalar comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// SQL operator token.
    pub fn as_sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// Spatial relationship predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpatialFunction {
    Intersects,
    Disjoint,
    Equals,
    Touches,
    Within,
    Overlaps,
    Crosses,
    Contains,
}

/// Temporal relationship predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalFunction {
    After,
    Before,
    During,
    Disjoint,
    Equals,
    Intersects,
}

/// Array relationship predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrayFunction {
    /// Left contains every element of right.
    Contains,
    /// Every element of left is in right.
    ContainedBy,
    /// Same elements.
    Equals,
    /// At least one shared element.
    Overlaps,
}

/// Scalar functions usable as operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Function {
    Upper,
    Lower,
    /// Case-insensitive comparison wrapper.
    Casei,
    /// Accent-insensitive comparison wrapper.
    Accenti,
    /// Row number of a row inside its parent relation.
    Position,
}

/// An operand of a predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    /// A queryable property of the feature, or a column name for row filters.
    Property(String),
    /// A scalar literal.
    Literal(Value),
    /// A geometry literal.
    Geometry(Geometry),
    /// A temporal literal.
    Temporal(TemporalLiteral),
    /// An interval built from two operands (properties or temporal literals).
    Interval {
        start: Box<Operand>,
        end: Box<Operand>,
    },
    /// An array literal.
    Array(Vec<Value>),
    /// A function applied to operands.
    Function {
        function: Function,
        #[serde(default)]
        args: Vec<Operand>,
    },
}

impl Operand {
    /// Create a property operand.
    pub fn property(name: impl Into<String>) -> Self {
        Operand::Property(name.into())
    }

    /// Create a scalar literal operand.
    pub fn literal(value: impl Into<Value>) -> Self {
        Operand::Literal(value.into())
    }

    /// Create a function operand.
    pub fn function(function: Function, args: Vec<Operand>) -> Self {
        Operand::Function { function, args }
    }

    /// `POSITION()`.
    pub fn position() -> Self {
        Operand::Function {
            function: Function::Position,
            args: vec![],
        }
    }

    /// Check if this operand is a literal of any kind.
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            Operand::Literal(_) | Operand::Geometry(_) | Operand::Temporal(_) | Operand::Array(_)
        )
    }

    fn collect_properties<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Operand::Property(name) => out.push(name),
            Operand::Interval { start, end } => {
                start.collect_properties(out);
                end.collect_properties(out);
            }
            Operand::Function { args, .. } => {
                for arg in args {
                    arg.collect_properties(out);
                }
            }
            Operand::Literal(_) | Operand::Geometry(_) | Operand::Temporal(_) | Operand::Array(_) => {}
        }
    }

    fn uses_position(&self) -> bool {
        match self {
            Operand::Function { function, args } => {
                *function == Function::Position || args.iter().any(Operand::uses_position)
            }
            Operand::Interval { start, end } => start.uses_position() || end.uses_position(),
            _ => false,
        }
    }
}

/// A boolean filter expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FilterExpr {
    /// All arguments must hold.
    And { args: Vec<FilterExpr> },
    /// At least one argument must hold.
    Or { args: Vec<FilterExpr> },
    /// Negation.
    Not { arg: Box<FilterExpr> },
    /// Scalar comparison.
    Compare {
        cmp: CompareOp,
        left: Operand,
        right: Operand,
    },
    /// Pattern match.
    Like { value: Operand, pattern: Operand },
    /// Membership in a literal list.
    In { value: Operand, list: Vec<Operand> },
    /// Null test.
    IsNull { value: Operand },
    /// Inclusive range test.
    Between {
        value: Operand,
        lower: Operand,
        upper: Operand,
    },
    /// Spatial predicate.
    Spatial {
        function: SpatialFunction,
        left: Operand,
        right: Operand,
    },
    /// Temporal predicate.
    Temporal {
        function: TemporalFunction,
        left: Operand,
        right: Operand,
    },
    /// Array predicate.
    Array {
        function: ArrayFunction,
        left: Operand,
        right: Operand,
    },
    /// Boolean constant.
    Bool { value: bool },
}

impl FilterExpr {
    fn compare(cmp: CompareOp, property: impl Into<String>, value: impl Into<Value>) -> Self {
        FilterExpr::Compare {
            cmp,
            left: Operand::property(property),
            right: Operand::literal(value),
        }
    }

    /// Create an equality filter.
    pub fn eq(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(CompareOp::Eq, property, value)
    }

    /// Create a not-equal filter.
    pub fn ne(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(CompareOp::Ne, property, value)
    }

    /// Create a less-than filter.
    pub fn lt(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(CompareOp::Lt, property, value)
    }

    /// Create a less-than-or-equal filter.
    pub fn le(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(CompareOp::Le, property, value)
    }

    /// Create a greater-than filter.
    pub fn gt(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(CompareOp::Gt, property, value)
    }

    /// Create a greater-than-or-equal filter.
    pub fn ge(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(CompareOp::Ge, property, value)
    }

    /// Create an IN filter.
    pub fn in_values(property: impl Into<String>, values: Vec<Value>) -> Self {
        FilterExpr::In {
            value: Operand::property(property),
            list: values.into_iter().map(Operand::Literal).collect(),
        }
    }

    /// Create an IS NULL filter.
    pub fn is_null(property: impl Into<String>) -> Self {
        FilterExpr::IsNull {
            value: Operand::property(property),
        }
    }

    /// Create a LIKE filter.
    pub fn like(property: impl Into<String>, pattern: impl Into<String>) -> Self {
        FilterExpr::Like {
            value: Operand::property(property),
            pattern: Operand::Literal(Value::String(pattern.into())),
        }
    }

    /// Create a BETWEEN filter.
    pub fn between(
        property: impl Into<String>,
        lower: impl Into<Value>,
        upper: impl Into<Value>,
    ) -> Self {
        FilterExpr::Between {
            value: Operand::property(property),
            lower: Operand::literal(lower),
            upper: Operand::literal(upper),
        }
    }

    /// Create a spatial predicate between a property and a geometry literal.
    pub fn spatial(function: SpatialFunction, property: impl Into<String>, geometry: Geometry) -> Self {
        FilterExpr::Spatial {
            function,
            left: Operand::property(property),
            right: Operand::Geometry(geometry),
        }
    }

    /// Create a temporal predicate between a property and a temporal literal.
    pub fn temporal(
        function: TemporalFunction,
        property: impl Into<String>,
        literal: TemporalLiteral,
    ) -> Self {
        FilterExpr::Temporal {
            function,
            left: Operand::property(property),
            right: Operand::Temporal(literal),
        }
    }

    /// Create an array predicate.
    pub fn array(function: ArrayFunction, left: Operand, right: Operand) -> Self {
        FilterExpr::Array {
            function,
            left,
            right,
        }
    }

    /// Combine expressions with AND. A single expression is returned as is.
    pub fn and(mut args: Vec<FilterExpr>) -> Self {
        if args.len() == 1 {
            if let Some(only) = args.pop() {
                return only;
            }
        }
        FilterExpr::And { args }
    }

    /// Combine expressions with OR.
    pub fn or(args: Vec<FilterExpr>) -> Self {
        FilterExpr::Or { args }
    }

    /// Negate an expression.
    pub fn not(arg: FilterExpr) -> Self {
        FilterExpr::Not { arg: Box::new(arg) }
    }

    /// All property names referenced anywhere in the tree, in visit order.
    pub fn properties(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_properties(&mut out);
        out
    }

    fn collect_properties<'a>(&'a self, out: &mut Vec<&'a str>) {
        for operand in self.operands() {
            operand.collect_properties(out);
        }
        for child in self.children() {
            child.collect_properties(out);
        }
    }

    /// Whether the tree refers to `POSITION()`.
    pub fn uses_position(&self) -> bool {
        self.operands().iter().any(|o| o.uses_position())
            || self.children().iter().any(|c| c.uses_position())
    }

    /// Direct operands of this node.
    pub fn operands(&self) -> Vec<&Operand> {
        match self {
            FilterExpr::Compare { left, right, .. }
            | FilterExpr::Spatial { left, right, .. }
            | FilterExpr::Temporal { left, right, .. }
            | FilterExpr::Array { left, right, .. } => vec![left, right],
            FilterExpr::Like { value, pattern } => vec![value, pattern],
            FilterExpr::In { value, list } => {
                let mut ops = vec![value];
                ops.extend(list.iter());
                ops
            }
            FilterExpr::IsNull { value } => vec![value],
            FilterExpr::Between {
                value,
                lower,
                upper,
            } => vec![value, lower, upper],
            FilterExpr::And { .. }
            | FilterExpr::Or { .. }
            | FilterExpr::Not { .. }
            | FilterExpr::Bool { .. } => vec![],
        }
    }

    fn children(&self) -> Vec<&FilterExpr> {
        match self {
            FilterExpr::And { args } | FilterExpr::Or { args } => args.iter().collect(),
            FilterExpr::Not { arg } => vec![arg.as_ref()],
            _ => vec![],
        }
    }
}
