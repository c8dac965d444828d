use std::fmt;
use std::time::Duration;

use crate::clock::Clock;

/// Bounded, ordered list of parameter sets to try, with a fixed delay between
/// attempts. The attempt count is the number of parameter sets, so a budget
/// can never retry forever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryBudget<P> {
    first: P,
    fallbacks: Vec<P>,
    delay: Duration,
}

/// One attempt as seen by the operation being retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt<'a, P> {
    /// 1-based attempt number.
    pub number: u32,
    pub total: u32,
    pub param: &'a P,
}

impl<'a, P> Attempt<'a, P> {
    fn new(number: u32, total: u32, param: &'a P) -> Self {
        Self {
            number,
            total,
            param,
        }
    }

    pub fn is_last(&self) -> bool {
        self.number == self.total
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

impl<E: fmt::Display> fmt::Display for RetryExhausted<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "gave up after {} attempts, last error: {}",
            self.attempts, self.last_error
        )
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RetryExhausted<E> {}

impl<P> RetryBudget<P> {
    pub fn new(first: P, fallbacks: impl IntoIterator<Item = P>, delay: Duration) -> Self {
        Self {
            first,
            fallbacks: fallbacks.into_iter().collect(),
            delay,
        }
    }

    /// A budget of exactly one attempt. `interval` is kept as the delay so
    /// callers that pace repeated single attempts can read it back.
    pub fn single(param: P, interval: Duration) -> Self {
        Self::new(param, Vec::new(), interval)
    }

    pub fn attempts(&self) -> u32 {
        1 + self.fallbacks.len() as u32
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn params(&self) -> impl Iterator<Item = &P> {
        std::iter::once(&self.first).chain(self.fallbacks.iter())
    }

    /// Run `op` for each parameter set in order until one succeeds.
    ///
    /// `on_failure` runs after every failed attempt (cleanup such as a driver
    /// deinit); the delay is only slept when another attempt follows.
    /// Returns the value and the attempt number that produced it.
    pub fn run<T, E, C>(
        &self,
        clock: &C,
        mut op: impl FnMut(Attempt<'_, P>) -> Result<T, E>,
        mut on_failure: impl FnMut(Attempt<'_, P>, &E),
    ) -> Result<(T, u32), RetryExhausted<E>>
    where
        C: Clock + ?Sized,
    {
        let total = self.attempts();

        let mut last_error = match op(Attempt::new(1, total, &self.first)) {
            Ok(value) => return Ok((value, 1)),
            Err(e) => {
                on_failure(Attempt::new(1, total, &self.first), &e);
                e
            }
        };

        for (index, param) in self.fallbacks.iter().enumerate() {
            let number = index as u32 + 2;
            clock.sleep(self.delay);
            match op(Attempt::new(number, total, param)) {
                Ok(value) => return Ok((value, number)),
                Err(e) => {
                    on_failure(Attempt::new(number, total, param), &e);
                    last_error = e;
                }
            }
        }

        Err(RetryExhausted {
            attempts: total,
            last_error,
        })
    }
}

impl<P: Clone> RetryBudget<P> {
    /// Same parameters for every attempt.
    pub fn repeat(param: P, attempts: u32, delay: Duration) -> Self {
        let extra = attempts.saturating_sub(1) as usize;
        Self::new(param.clone(), std::iter::repeat(param).take(extra), delay)
    }
}
