//! Explicit Runge-Kutta tableaux and stage arithmetic.
//!
//! A macro-step of size `h` is split into `s` stages. Stage `i` samples
//! the velocity at `x0 + Σ_j a[i][j]·K_j` and time fraction `c[i]`; its
//! increment `K_i` is that velocity (plus any force) scaled by `h`. After
//! the last stage the marker moves to `x0 + Σ_j b[j]·K_j`.

use wake_core::Point;

use crate::config::ConfigError;

/// Supported Runge-Kutta orders.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RkOrder {
    /// Forward Euler.
    #[default]
    First,
    /// Heun's method.
    Second,
    /// Kutta's third-order method.
    Third,
    /// The classic fourth-order method.
    Fourth,
}

impl RkOrder {
    /// Number of stages per macro-step.
    pub fn stages(self) -> usize {
        match self {
            Self::First => 1,
            Self::Second => 2,
            Self::Third => 3,
            Self::Fourth => 4,
        }
    }

    /// The tableau for this order.
    pub fn tableau(self) -> &'static ButcherTableau {
        match self {
            Self::First => &EULER,
            Self::Second => &HEUN,
            Self::Third => &KUTTA3,
            Self::Fourth => &RK4,
        }
    }
}

impl TryFrom<u32> for RkOrder {
    type Error = ConfigError;

    fn try_from(order: u32) -> Result<Self, Self::Error> {
        match order {
            1 => Ok(Self::First),
            2 => Ok(Self::Second),
            3 => Ok(Self::Third),
            4 => Ok(Self::Fourth),
            _ => Err(ConfigError::UnsupportedOrder { order }),
        }
    }
}

/// Coefficients of an explicit Runge-Kutta method.
///
/// `a` is strictly lower triangular and stored by rows: row `i` holds
/// the `i` weights of the stages before it.
#[derive(Debug)]
pub struct ButcherTableau {
    a: &'static [&'static [f64]],
    b: &'static [f64],
    c: &'static [f64],
}

static EULER: ButcherTableau = ButcherTableau {
    a: &[&[]],
    b: &[1.0],
    c: &[0.0],
};

static HEUN: ButcherTableau = ButcherTableau {
    a: &[&[], &[1.0]],
    b: &[0.5, 0.5],
    c: &[0.0, 1.0],
};

static KUTTA3: ButcherTableau = ButcherTableau {
    a: &[&[], &[0.5], &[-1.0, 2.0]],
    b: &[1.0 / 6.0, 2.0 / 3.0, 1.0 / 6.0],
    c: &[0.0, 0.5, 1.0],
};

static RK4: ButcherTableau = ButcherTableau {
    a: &[&[], &[0.5], &[0.0, 0.5], &[0.0, 0.0, 1.0]],
    b: &[1.0 / 6.0, 1.0 / 3.0, 1.0 / 3.0, 1.0 / 6.0],
    c: &[0.0, 0.5, 0.5, 1.0],
};

impl ButcherTableau {
    /// Number of stages.
    pub fn stages(&self) -> usize {
        self.b.len()
    }

    /// Row `stage` of `a`.
    pub fn a(&self, stage: usize) -> &'static [f64] {
        self.a[stage]
    }

    /// Final weights.
    pub fn b(&self) -> &'static [f64] {
        self.b
    }

    /// Stage nodes.
    pub fn c(&self) -> &'static [f64] {
        self.c
    }

    /// Sample point of `stage`: `old + Σ_j a[stage][j]·k[j]`.
    pub fn stage_point(&self, stage: usize, old: &[f64], k: &[Point]) -> Point {
        weighted_sum(old, self.a[stage], k)
    }

    /// Position at the end of the macro-step: `old + Σ_j b[j]·k[j]`.
    pub fn advance(&self, old: &[f64], k: &[Point]) -> Point {
        weighted_sum(old, self.b, k)
    }

    /// Fraction of the whole interval at which `stage` of macro-step
    /// `macro_index` samples the velocity: `(macro_index + c[stage]) / n`.
    pub fn time_fraction(&self, macro_index: u32, stage: usize, substeps: u32) -> f64 {
        (f64::from(macro_index) + self.c[stage]) / f64::from(substeps)
    }
}

fn weighted_sum(old: &[f64], weights: &[f64], k: &[Point]) -> Point {
    let mut x = Point::from_slice(old);
    for (w, kj) in weights.iter().zip(k) {
        for (xd, kd) in x.iter_mut().zip(kj.iter()) {
            *xd += w * kd;
        }
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    const ALL: [RkOrder; 4] = [RkOrder::First, RkOrder::Second, RkOrder::Third, RkOrder::Fourth];

    #[test]
    fn weights_sum_to_one() {
        for order in ALL {
            let sum: f64 = order.tableau().b().iter().sum();
            assert!((sum - 1.0).abs() < 1e-15, "{order:?}: {sum}");
        }
    }

    #[test]
    fn nodes_match_row_sums() {
        for order in ALL {
            let t = order.tableau();
            for i in 0..t.stages() {
                let row: f64 = t.a(i).iter().sum();
                assert!((row - t.c()[i]).abs() < 1e-15, "{order:?} row {i}");
            }
        }
    }

    #[test]
    fn rows_are_strictly_lower_triangular() {
        for order in ALL {
            let t = order.tableau();
            assert_eq!(t.stages(), order.stages());
            for i in 0..t.stages() {
                assert_eq!(t.a(i).len(), i);
            }
        }
    }

    #[test]
    fn order_from_integer() {
        assert_eq!(RkOrder::try_from(3), Ok(RkOrder::Third));
        assert_eq!(
            RkOrder::try_from(5),
            Err(ConfigError::UnsupportedOrder { order: 5 })
        );
        assert_eq!(
            RkOrder::try_from(0),
            Err(ConfigError::UnsupportedOrder { order: 0 })
        );
    }

    #[test]
    fn heun_stage_point_and_advance() {
        let t = RkOrder::Second.tableau();
        let old = [1.0, 2.0];
        let k: [Point; 2] = [smallvec![0.2, 0.0], smallvec![0.4, 1.0]];
        let mid = t.stage_point(1, &old, &k);
        assert!((mid[0] - 1.2).abs() < 1e-15);
        assert_eq!(mid[1], 2.0);
        let end = t.advance(&old, &k);
        assert!((end[0] - 1.3).abs() < 1e-15);
        assert!((end[1] - 2.5).abs() < 1e-15);
    }

    #[test]
    fn time_fraction_spans_the_interval() {
        let t = RkOrder::Fourth.tableau();
        assert_eq!(t.time_fraction(0, 0, 4), 0.0);
        assert_eq!(t.time_fraction(1, 1, 4), 0.375);
        assert_eq!(t.time_fraction(3, 3, 4), 1.0);
    }

    #[test]
    fn rk4_integrates_exponential_growth() {
        // dx/dt = x over [0, 1] with 10 steps.
        let t = RkOrder::Fourth.tableau();
        let h = 0.1;
        let mut x: Point = smallvec![1.0];
        for _ in 0..10 {
            let old = x.clone();
            let mut k: Vec<Point> = vec![smallvec![0.0]; 4];
            for i in 0..4 {
                let p = t.stage_point(i, &old, &k);
                k[i] = smallvec![p[0] * h];
            }
            x = t.advance(&old, &k);
        }
        assert!((x[0] - std::f64::consts::E).abs() < 1e-5);
    }
}
