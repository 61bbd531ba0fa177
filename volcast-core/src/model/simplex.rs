//! Nelder–Mead simplex minimiser.
//!
//! Derivative-free, which suits the GARCH likelihood: the objective is cheap
//! to evaluate but its gradient through the variance recursion is tedious.
//! Non-finite objective values are treated as +inf, so the search simply
//! backs away from invalid regions.

const REFLECT: f64 = 1.0;
const EXPAND: f64 = 2.0;
const CONTRACT: f64 = 0.5;
const SHRINK: f64 = 0.5;

/// Stopping rules for the search.
#[derive(Debug, Clone, Copy)]
pub struct SimplexOptions {
    pub max_iterations: usize,
    /// Absolute spread of objective values across the simplex.
    pub f_tolerance: f64,
    /// Largest coordinate distance from the best vertex.
    pub x_tolerance: f64,
}

impl Default for SimplexOptions {
    fn default() -> Self {
        Self {
            max_iterations: 5_000,
            f_tolerance: 1e-10,
            x_tolerance: 1e-8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimplexResult {
    pub x: Vec<f64>,
    pub fx: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Minimise `f` starting from `x0`, with per-coordinate initial steps.
pub fn minimize<F>(f: F, x0: &[f64], steps: &[f64], opts: &SimplexOptions) -> SimplexResult
where
    F: Fn(&[f64]) -> f64,
{
    let n = x0.len();
    let eval = |x: &[f64]| {
        let v = f(x);
        if v.is_finite() {
            v
        } else {
            f64::INFINITY
        }
    };

    let mut vertices: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
    vertices.push(x0.to_vec());
    for i in 0..n {
        let mut v = x0.to_vec();
        v[i] += steps.get(i).copied().unwrap_or(0.1);
        vertices.push(v);
    }
    let mut values: Vec<f64> = vertices.iter().map(|v| eval(v)).collect();

    let mut iterations = 0;
    let mut converged = false;

    while iterations < opts.max_iterations {
        // Order vertices best → worst.
        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        vertices = order.iter().map(|&i| vertices[i].clone()).collect();
        values = order.iter().map(|&i| values[i]).collect();

        let f_spread = (values[n] - values[0]).abs();
        let x_spread = vertices[1..]
            .iter()
            .flat_map(|v| v.iter().zip(&vertices[0]).map(|(a, b)| (a - b).abs()))
            .fold(0.0_f64, f64::max);
        if values[0].is_finite() && f_spread <= opts.f_tolerance && x_spread <= opts.x_tolerance {
            converged = true;
            break;
        }

        iterations += 1;

        let centroid: Vec<f64> = (0..n)
            .map(|j| vertices[..n].iter().map(|v| v[j]).sum::<f64>() / n as f64)
            .collect();
        let toward = |coef: f64| -> Vec<f64> {
            centroid
                .iter()
                .zip(&vertices[n])
                .map(|(c, w)| c + coef * (c - w))
                .collect()
        };

        let reflected = toward(REFLECT);
        let f_reflected = eval(&reflected);

        if f_reflected < values[0] {
            let expanded = toward(EXPAND);
            let f_expanded = eval(&expanded);
            if f_expanded < f_reflected {
                vertices[n] = expanded;
                values[n] = f_expanded;
            } else {
                vertices[n] = reflected;
                values[n] = f_reflected;
            }
            continue;
        }

        if f_reflected < values[n - 1] {
            vertices[n] = reflected;
            values[n] = f_reflected;
            continue;
        }

        let (contracted, f_contracted) = if f_reflected < values[n] {
            let c = toward(CONTRACT * REFLECT);
            let fc = eval(&c);
            (c, fc)
        } else {
            let c = toward(-CONTRACT);
            let fc = eval(&c);
            (c, fc)
        };
        if f_contracted < values[n].min(f_reflected) {
            vertices[n] = contracted;
            values[n] = f_contracted;
            continue;
        }

        // Shrink toward the best vertex.
        let best = vertices[0].clone();
        for k in 1..=n {
            for j in 0..n {
                vertices[k][j] = best[j] + SHRINK * (vertices[k][j] - best[j]);
            }
            values[k] = eval(&vertices[k]);
        }
    }

    let best = (0..=n)
        .min_by(|&a, &b| values[a].total_cmp(&values[b]))
        .unwrap_or(0);

    SimplexResult {
        x: vertices[best].clone(),
        fx: values[best],
        iterations,
        converged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_quadratic_minimum() {
        let f = |x: &[f64]| (x[0] - 3.0).powi(2) + (x[1] + 1.0).powi(2) + 2.0;
        let res = minimize(f, &[0.0, 0.0], &[0.5, 0.5], &SimplexOptions::default());

        assert!(res.converged);
        assert!((res.x[0] - 3.0).abs() < 1e-4);
        assert!((res.x[1] + 1.0).abs() < 1e-4);
        assert!((res.fx - 2.0).abs() < 1e-8);
    }

    #[test]
    fn minimises_rosenbrock() {
        let f = |x: &[f64]| (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2);
        let res = minimize(f, &[-1.2, 1.0], &[0.1, 0.1], &SimplexOptions::default());

        assert!((res.x[0] - 1.0).abs() < 1e-3);
        assert!((res.x[1] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn backs_away_from_non_finite_regions() {
        // Undefined for x <= 0.
        let f = |x: &[f64]| if x[0] <= 0.0 { f64::NAN } else { (x[0].ln() - 1.0).powi(2) };
        let res = minimize(f, &[0.5], &[1.0], &SimplexOptions::default());

        assert!((res.x[0] - std::f64::consts::E).abs() < 1e-3);
    }

    #[test]
    fn reports_iteration_cap() {
        let f = |x: &[f64]| (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2);
        let opts = SimplexOptions {
            max_iterations: 3,
            ..SimplexOptions::default()
        };
        let res = minimize(f, &[-1.2, 1.0], &[0.1, 0.1], &opts);

        assert!(!res.converged);
        assert_eq!(res.iterations, 3);
    }
}
