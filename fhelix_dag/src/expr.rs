use std::ops::{Add, Div, Mul, Neg, Shl, Shr, Sub};

use crate::group::group_make_node;
use crate::{DagRef, NodeIndex, Op};

#[derive(Clone)]
/**
 * A handle to a node used while building a program through arithmetic
 * operators. Every operation on an `Expr` appends nodes to the DAG it was
 * created from:
 *
 * ```ignore
 * let x = set_input(&dag, "x");
 * set_output(&dag, "out", x.clone() * x + 1.0);
 * ```
 *
 * `<<` and `>>` rotate by a constant amount. Dividing by an `Expr` inserts
 * a `Div` node and routes the program to the small-integer backend;
 * dividing by a scalar multiplies by its reciprocal.
 */
pub struct Expr {
    dag: DagRef,
    node: NodeIndex,
}

impl Expr {
    /**
     * Wraps an existing node.
     */
    pub fn new(dag: DagRef, node: NodeIndex) -> Self {
        Self { dag, node }
    }

    /**
     * The node this expression denotes.
     */
    pub fn node_index(&self) -> NodeIndex {
        self.node
    }

    /**
     * The DAG this expression builds into.
     */
    pub fn dag(&self) -> &DagRef {
        &self.dag
    }

    /**
     * A constant expression with `value` in every slot.
     */
    pub fn uniform(dag: &DagRef, value: f64) -> Self {
        let node = dag.borrow_mut().make_uniform_constant(value);
        Self::new(dag.clone(), node)
    }

    /**
     * A dense double constant expression.
     */
    pub fn from_vec(dag: &DagRef, values: Vec<f64>) -> Self {
        let node = dag
            .borrow_mut()
            .make_dense_constant(values)
            .expect("constant length must divide the slot count");
        Self::new(dag.clone(), node)
    }

    /**
     * A dense 64-bit integer constant expression.
     */
    pub fn from_i64_vec(dag: &DagRef, values: Vec<i64>) -> Self {
        let node = dag
            .borrow_mut()
            .make_int64_dense_constant(values)
            .expect("constant length must divide the slot count");
        Self::new(dag.clone(), node)
    }

    /**
     * A uniform 64-bit integer constant expression.
     */
    pub fn from_i64(dag: &DagRef, value: i64) -> Self {
        Self::from_i64_vec(dag, vec![value])
    }

    fn make(&self, op: Op, operands: &[NodeIndex]) -> Expr {
        let is_group = self.dag.borrow().is_group();

        let node = if is_group {
            group_make_node(&self.dag, op, operands)
        } else {
            self.dag.borrow_mut().make_node(op, operands)
        };

        Expr::new(self.dag.clone(), node)
    }

    fn binary(&self, op: Op, rhs: &Expr) -> Expr {
        self.make(op, &[self.node, rhs.node])
    }
}

impl std::fmt::Debug for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Expr({})", self.node)
    }
}

impl Add for Expr {
    type Output = Expr;

    fn add(self, rhs: Expr) -> Expr {
        self.binary(Op::Add, &rhs)
    }
}

impl Sub for Expr {
    type Output = Expr;

    fn sub(self, rhs: Expr) -> Expr {
        self.binary(Op::Sub, &rhs)
    }
}

impl Mul for Expr {
    type Output = Expr;

    fn mul(self, rhs: Expr) -> Expr {
        self.binary(Op::Mul, &rhs)
    }
}

impl Div for Expr {
    type Output = Expr;

    fn div(self, rhs: Expr) -> Expr {
        // Only the small-integer backend divides natively; make_node marks
        // the DAG short_int when it sees the opcode.
        self.binary(Op::Div, &rhs)
    }
}

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        self.make(Op::Negate, &[self.node])
    }
}

impl Shl<u32> for Expr {
    type Output = Expr;

    fn shl(self, amount: u32) -> Expr {
        let node = self.dag.borrow_mut().make_left_rotation(self.node, amount);
        Expr::new(self.dag.clone(), node)
    }
}

impl Shr<u32> for Expr {
    type Output = Expr;

    fn shr(self, amount: u32) -> Expr {
        let node =
            self.dag.borrow_mut().make_right_rotation(self.node, amount);
        Expr::new(self.dag.clone(), node)
    }
}

macro_rules! scalar_ops {
    ($scalar:ty, $to_expr:expr) => {
        impl Add<$scalar> for Expr {
            type Output = Expr;

            fn add(self, rhs: $scalar) -> Expr {
                let rhs = $to_expr(&self.dag, rhs);
                self + rhs
            }
        }

        impl Add<Expr> for $scalar {
            type Output = Expr;

            fn add(self, rhs: Expr) -> Expr {
                $to_expr(&rhs.dag, self) + rhs
            }
        }

        impl Sub<$scalar> for Expr {
            type Output = Expr;

            fn sub(self, rhs: $scalar) -> Expr {
                let rhs = $to_expr(&self.dag, rhs);
                self - rhs
            }
        }

        impl Sub<Expr> for $scalar {
            type Output = Expr;

            fn sub(self, rhs: Expr) -> Expr {
                $to_expr(&rhs.dag, self) - rhs
            }
        }

        impl Mul<$scalar> for Expr {
            type Output = Expr;

            fn mul(self, rhs: $scalar) -> Expr {
                let rhs = $to_expr(&self.dag, rhs);
                self * rhs
            }
        }

        impl Mul<Expr> for $scalar {
            type Output = Expr;

            fn mul(self, rhs: Expr) -> Expr {
                $to_expr(&rhs.dag, self) * rhs
            }
        }
    };
}

scalar_ops!(f64, |dag, v| Expr::uniform(dag, v));
scalar_ops!(i64, |dag, v| Expr::from_i64(dag, v));
scalar_ops!(Vec<f64>, |dag, v| Expr::from_vec(dag, v));
scalar_ops!(Vec<i64>, |dag, v| Expr::from_i64_vec(dag, v));

impl Div<f64> for Expr {
    type Output = Expr;

    fn div(self, rhs: f64) -> Expr {
        let recip = Expr::uniform(&self.dag, 1.0 / rhs);
        self * recip
    }
}

impl Div<Expr> for u8 {
    type Output = Expr;

    fn div(self, rhs: Expr) -> Expr {
        let lhs = Expr::uniform(&rhs.dag, self as f64);
        lhs / rhs
    }
}

impl Div<u8> for Expr {
    type Output = Expr;

    fn div(self, rhs: u8) -> Expr {
        let rhs = Expr::uniform(&self.dag, rhs as f64);
        self / rhs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Dag, DataType};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn dag() -> DagRef {
        Rc::new(RefCell::new(Dag::new("expr", 4).unwrap()))
    }

    fn input(dag: &DagRef, name: &str) -> Expr {
        let node = dag.borrow_mut().make_input(name, DataType::Cipher);
        Expr::new(dag.clone(), node)
    }

    #[test]
    fn operators_build_nodes() {
        let dag = dag();
        let x = input(&dag, "x");
        let y = input(&dag, "y");

        let z = x.clone() * y + 1.0 - x;
        let d = dag.borrow();

        assert_eq!(d.node(z.node_index()).op, Op::Sub);
        // x, y, mul, const, add, sub
        assert_eq!(d.node_count(), 6);
    }

    #[test]
    fn rotations_carry_amounts() {
        let dag = dag();
        let x = input(&dag, "x");

        let l = x.clone() << 2u32;
        let r = x >> 1u32;
        let d = dag.borrow();

        assert_eq!(d.node(l.node_index()).op, Op::RotateLeftConst);
        assert_eq!(
            d.node(l.node_index()).get::<crate::attr::Rotation>(),
            Some(2)
        );
        assert_eq!(d.node(r.node_index()).op, Op::RotateRightConst);
    }

    #[test]
    fn expr_division_marks_short_int() {
        let dag = dag();
        let x = input(&dag, "x");

        let _ = 2u8 / x;

        assert!(dag.borrow().short_int);
    }

    #[test]
    fn scalar_division_stays_arithmetic() {
        let dag = dag();
        let x = input(&dag, "x");

        let z = x / 4.0;

        let d = dag.borrow();
        assert_eq!(d.node(z.node_index()).op, Op::Mul);
        assert!(!d.short_int);
    }
}
