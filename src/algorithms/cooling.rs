/// График охлаждения, ограничивающий смещение за итерацию
///
/// Температура стартует с `frame width / 10` и после каждой итерации делится
/// на `iterations + 1`. Затухание не зависит от номера итерации.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoolingScheduler {
    initial: f64,
    divisor: f64,
}

impl CoolingScheduler {
    pub fn new(initial_temperature: f64, iterations: usize) -> Self {
        Self {
            initial: initial_temperature,
            divisor: iterations as f64 + 1.0,
        }
    }

    pub fn initial(&self) -> f64 {
        self.initial
    }

    /// Температура следующей итерации после `temperature`
    pub fn next(&self, temperature: f64) -> f64 {
        temperature / self.divisor
    }

    /// Температура на итерации `iteration` (с нуля)
    pub fn temperature_at(&self, iteration: usize) -> f64 {
        self.schedule().nth(iteration).unwrap_or(0.0)
    }

    /// Бесконечная последовательность температур от начальной
    pub fn schedule(&self) -> impl Iterator<Item = f64> {
        let scheduler = *self;
        std::iter::successors(Some(self.initial), move |&t| Some(scheduler.next(t)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temperature_never_increases() {
        let scheduler = CoolingScheduler::new(0.5, 10);
        let temperatures: Vec<f64> = scheduler.schedule().take(12).collect();
        for pair in temperatures.windows(2) {
            assert!(pair[1] <= pair[0], "{} followed by {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn decay_is_fixed_by_iteration_count() {
        let scheduler = CoolingScheduler::new(1.0, 4);
        assert_eq!(scheduler.next(1.0), 0.2);
        assert_eq!(scheduler.next(0.5), 0.1);
        assert_eq!(scheduler.temperature_at(0), 1.0);
        assert_eq!(scheduler.temperature_at(2), scheduler.next(scheduler.next(1.0)));
    }

    #[test]
    fn zero_iterations_keeps_temperature() {
        let scheduler = CoolingScheduler::new(0.3, 0);
        assert_eq!(scheduler.next(0.3), 0.3);
    }
}
