//! Configuration for the annealing schedule and both sub-solvers.

use rpm_core::{Error, Result};

/// Configuration for a TPS-RPM estimate.
///
/// All schedule parameters are carried explicitly; nothing is read from
/// process-wide state. The defaults describe the primary configuration in
/// the unit-normalized frame.
#[derive(Debug, Clone)]
pub struct RpmConfig {
    /// Starting temperature. `None` derives it from the mean squared
    /// pairwise distance of the normalized inputs.
    pub t_start: Option<f64>,
    /// Geometric cooling ratio applied to the temperature and the bending
    /// weight after each outer step. Must lie in (0, 1).
    pub annealing_ratio: f64,
    /// Final temperature as a fraction of the starting temperature.
    pub t_end_ratio: f64,
    /// Correspondence/transform alternations per temperature step.
    pub inner_iterations: usize,
    /// Row/column normalization sweeps per SoftAssign run.
    pub softassign_iterations: usize,
    /// Outlier rejection threshold on squared distance: pairs farther apart
    /// than this receive sub-unit affinity and leak mass to the slack line.
    pub alpha: f64,
    /// Starting bending-energy weight. `None` ties it to the starting
    /// temperature.
    pub lambda_start: Option<f64>,
    /// Mass floor below which a row or column is left unnormalized.
    pub mass_epsilon: f64,
    /// Ridge the affine solve toward the identity. Required when the source
    /// set is collinear and the affine system alone is rank-deficient.
    pub affine_regularization: bool,
    /// Divide mapped target rows by their correspondence mass, discounting
    /// source-side outliers in the transform fit as well.
    pub both_side_outlier: bool,
}

impl Default for RpmConfig {
    fn default() -> Self {
        Self {
            t_start: None,
            annealing_ratio: 0.90,
            t_end_ratio: 1e-3,
            inner_iterations: 5,
            softassign_iterations: 10,
            alpha: 0.1,
            lambda_start: None,
            mass_epsilon: 1e-4,
            affine_regularization: false,
            both_side_outlier: false,
        }
    }
}

impl RpmConfig {
    pub fn with_t_start(mut self, t_start: f64) -> Self {
        self.t_start = Some(t_start);
        self
    }

    pub fn with_annealing_ratio(mut self, ratio: f64) -> Self {
        self.annealing_ratio = ratio;
        self
    }

    pub fn with_t_end_ratio(mut self, ratio: f64) -> Self {
        self.t_end_ratio = ratio;
        self
    }

    pub fn with_inner_iterations(mut self, iterations: usize) -> Self {
        self.inner_iterations = iterations;
        self
    }

    pub fn with_softassign_iterations(mut self, iterations: usize) -> Self {
        self.softassign_iterations = iterations;
        self
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_lambda_start(mut self, lambda: f64) -> Self {
        self.lambda_start = Some(lambda);
        self
    }

    pub fn with_mass_epsilon(mut self, epsilon: f64) -> Self {
        self.mass_epsilon = epsilon;
        self
    }

    pub fn with_affine_regularization(mut self, enabled: bool) -> Self {
        self.affine_regularization = enabled;
        self
    }

    pub fn with_both_side_outlier(mut self, enabled: bool) -> Self {
        self.both_side_outlier = enabled;
        self
    }

    /// Check that the parameters describe a terminating anneal.
    pub fn validate(&self) -> Result<()> {
        if !(self.annealing_ratio > 0.0 && self.annealing_ratio < 1.0) {
            return Err(Error::InvalidInput(format!(
                "annealing ratio must lie in (0, 1), got {}",
                self.annealing_ratio
            )));
        }
        if !(self.t_end_ratio > 0.0 && self.t_end_ratio < 1.0) {
            return Err(Error::InvalidInput(format!(
                "final temperature ratio must lie in (0, 1), got {}",
                self.t_end_ratio
            )));
        }
        if let Some(t) = self.t_start {
            if !t.is_finite() || t <= 0.0 {
                return Err(Error::InvalidInput(format!(
                    "starting temperature must be positive, got {t}"
                )));
            }
        }
        if let Some(lambda) = self.lambda_start {
            if !lambda.is_finite() || lambda <= 0.0 {
                return Err(Error::InvalidInput(format!(
                    "starting bending weight must be positive, got {lambda}"
                )));
            }
        }
        if self.inner_iterations == 0 || self.softassign_iterations == 0 {
            return Err(Error::InvalidInput(
                "iteration counts must be at least 1".to_string(),
            ));
        }
        if !self.alpha.is_finite() {
            return Err(Error::InvalidInput(format!(
                "outlier threshold must be finite, got {}",
                self.alpha
            )));
        }
        if !(self.mass_epsilon > 0.0) {
            return Err(Error::InvalidInput(format!(
                "mass floor must be positive, got {}",
                self.mass_epsilon
            )));
        }
        Ok(())
    }
}
