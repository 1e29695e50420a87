use crate::algebra::AlgebraOptimiser;
use crate::error::UpdateEvaluationError;
use spargebra::algebra::GraphPattern;
use std::sync::Arc;
use std::time::{Duration, Instant};

const MIN_REMAINING_TIMEOUT: Duration = Duration::from_millis(1);

/// State of one command set execution: its start time, its time budget and its optimisers.
pub struct UpdateEvaluationContext<'a> {
    start: Instant,
    timeout: Option<Duration>,
    optimisers: &'a [Arc<dyn AlgebraOptimiser>],
}

impl<'a> UpdateEvaluationContext<'a> {
    /// Starts the timer.
    ///
    /// `requested` is the command set timeout and `ceiling` the processor one.
    pub fn new(
        requested: Option<Duration>,
        ceiling: Option<Duration>,
        optimisers: &'a [Arc<dyn AlgebraOptimiser>],
    ) -> Self {
        Self {
            start: Instant::now(),
            timeout: effective_timeout(requested, ceiling),
            optimisers,
        }
    }

    /// Starts the timer again, for example once the dataset lock is held.
    #[inline]
    pub fn restart(&mut self) {
        self.start = Instant::now();
    }

    #[inline]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Fails with [`UpdateEvaluationError::Timeout`] if the budget is exhausted.
    pub fn check_timeout(&self) -> Result<(), UpdateEvaluationError> {
        match self.timeout {
            Some(timeout) if self.elapsed() > timeout => {
                Err(UpdateEvaluationError::Timeout(timeout))
            }
            _ => Ok(()),
        }
    }

    /// Time left before the timeout, never less than a millisecond. `None` if unbounded.
    pub fn remaining_timeout(&self) -> Option<Duration> {
        self.timeout.map(|timeout| {
            timeout
                .saturating_sub(self.elapsed())
                .max(MIN_REMAINING_TIMEOUT)
        })
    }

    /// Applies the optimisers to a `WHERE` pattern.
    pub fn optimise(&self, pattern: &GraphPattern) -> GraphPattern {
        self.optimisers
            .iter()
            .fold(pattern.clone(), |pattern, optimiser| optimiser.optimise(pattern))
    }
}

/// The command set timeout wins if it is set and lower than the processor ceiling.
pub fn effective_timeout(requested: Option<Duration>, ceiling: Option<Duration>) -> Option<Duration> {
    let requested = requested.filter(|t| !t.is_zero());
    let ceiling = ceiling.filter(|t| !t.is_zero());
    match (requested, ceiling) {
        (Some(requested), Some(ceiling)) if requested <= ceiling => Some(requested),
        (Some(requested), None) => Some(requested),
        (_, ceiling) => ceiling,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn timeout_precedence() {
        let ms = Duration::from_millis;
        assert_eq!(effective_timeout(None, None), None);
        assert_eq!(effective_timeout(Some(ms(50)), None), Some(ms(50)));
        assert_eq!(effective_timeout(Some(ms(50)), Some(ms(100))), Some(ms(50)));
        assert_eq!(effective_timeout(Some(ms(500)), Some(ms(100))), Some(ms(100)));
        assert_eq!(effective_timeout(None, Some(ms(100))), Some(ms(100)));
        assert_eq!(effective_timeout(Some(Duration::ZERO), Some(ms(100))), Some(ms(100)));
        assert_eq!(effective_timeout(Some(ms(50)), Some(Duration::ZERO)), Some(ms(50)));
    }

    #[test]
    #[expect(clippy::panic_in_result_fn)]
    fn check_and_remaining() -> Result<(), UpdateEvaluationError> {
        let context = UpdateEvaluationContext::new(Some(Duration::from_millis(5)), None, &[]);
        context.check_timeout()?;
        sleep(Duration::from_millis(10));
        assert!(
            context
                .check_timeout()
                .is_err_and(|e| e.is_timeout())
        );
        assert_eq!(context.remaining_timeout(), Some(MIN_REMAINING_TIMEOUT));

        let unbounded = UpdateEvaluationContext::new(None, None, &[]);
        unbounded.check_timeout()?;
        assert_eq!(unbounded.remaining_timeout(), None);
        Ok(())
    }

    #[test]
    #[expect(clippy::panic_in_result_fn)]
    fn restart_resets_the_budget() -> Result<(), UpdateEvaluationError> {
        let mut context = UpdateEvaluationContext::new(Some(Duration::from_millis(5)), None, &[]);
        sleep(Duration::from_millis(10));
        assert!(context.check_timeout().is_err());
        context.restart();
        context.check_timeout()?;
        assert!(context.elapsed() < Duration::from_millis(5));
        Ok(())
    }

    #[test]
    fn optimisers_are_applied_in_order() {
        let optimisers: Vec<Arc<dyn AlgebraOptimiser>> = vec![
            Arc::new(|p: GraphPattern| GraphPattern::Distinct { inner: Box::new(p) }),
            Arc::new(|p: GraphPattern| GraphPattern::Reduced { inner: Box::new(p) }),
        ];
        let context = UpdateEvaluationContext::new(None, None, &optimisers);
        let pattern = context.optimise(&GraphPattern::Bgp {
            patterns: Vec::new(),
        });
        assert!(matches!(
            pattern,
            GraphPattern::Reduced { inner } if matches!(*inner, GraphPattern::Distinct { .. })
        ));
    }
}
