use farm_model::FarmLimits;

/// Inputs of one scaling decision.
#[derive(Clone, Copy, Debug)]
pub struct ScaleInput {
    pub queue_depth: u32,
    /// Pending plus tracked workers, retiring ones excluded.
    pub current: usize,
    /// Idle workers with a recent heartbeat.
    pub idle: usize,
    pub limits: FarmLimits,
    pub prefetch: usize,
    pub up_batch: usize,
    pub down_batch: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScaleDecision {
    Up(usize),
    Down(usize),
    Hold,
}

impl ScaleInput {
    /// Messages the current workers can hold in flight.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.current * self.prefetch.max(1)
    }
}

/// Decides how many workers to add or retire.
///
/// - below `min_workers` the farm is refilled up to the minimum
/// - backlog above capacity adds up to `up_batch` workers, never beyond `max_workers`
/// - a backlog that would fit with one worker less retires up to `down_batch` idle workers,
///   never below `min_workers`
pub fn decide(input: &ScaleInput) -> ScaleDecision {
    let ScaleInput {
        queue_depth,
        current,
        idle,
        limits,
        up_batch,
        down_batch,
        ..
    } = *input;
    let prefetch = input.prefetch.max(1);
    let depth = queue_depth as usize;

    if current < limits.min_workers {
        let n = limits.min_workers.min(limits.max_workers) - current.min(limits.max_workers);
        return if n > 0 { ScaleDecision::Up(n) } else { ScaleDecision::Hold };
    }

    if depth > input.capacity() && current < limits.max_workers {
        let n = up_batch.max(1).min(limits.max_workers - current);
        return ScaleDecision::Up(n);
    }

    let after_one_less = current.saturating_sub(1) * prefetch;
    if depth <= after_one_less && current > limits.min_workers {
        let n = down_batch.max(1).min(current - limits.min_workers).min(idle);
        if n > 0 {
            return ScaleDecision::Down(n);
        }
    }

    ScaleDecision::Hold
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(depth: u32, current: usize, idle: usize) -> ScaleInput {
        ScaleInput {
            queue_depth: depth,
            current,
            idle,
            limits: FarmLimits {
                min_workers: 1,
                max_workers: 3,
            },
            prefetch: 10,
            up_batch: 1,
            down_batch: 1,
        }
    }

    #[test]
    fn backlog_grows_the_farm_up_to_max() {
        assert_eq!(decide(&input(25, 1, 0)), ScaleDecision::Up(1));
        assert_eq!(decide(&input(25, 2, 0)), ScaleDecision::Up(1));
        assert_eq!(decide(&input(25, 3, 0)), ScaleDecision::Hold);
        assert_eq!(decide(&input(1_000, 3, 0)), ScaleDecision::Hold);
    }

    #[test]
    fn backlog_within_capacity_holds() {
        assert_eq!(decide(&input(10, 1, 0)), ScaleDecision::Hold);
        assert_eq!(decide(&input(15, 2, 0)), ScaleDecision::Hold);
    }

    #[test]
    fn empty_queue_retires_idle_workers_down_to_min() {
        assert_eq!(decide(&input(0, 3, 3)), ScaleDecision::Down(1));
        assert_eq!(decide(&input(0, 2, 2)), ScaleDecision::Down(1));
        assert_eq!(decide(&input(0, 1, 1)), ScaleDecision::Hold);
    }

    #[test]
    fn busy_workers_are_never_retired() {
        assert_eq!(decide(&input(0, 3, 0)), ScaleDecision::Hold);
    }

    #[test]
    fn missing_workers_are_replaced_up_to_min() {
        let mut i = input(0, 0, 0);
        i.limits.min_workers = 2;
        assert_eq!(decide(&i), ScaleDecision::Up(2));
    }

    #[test]
    fn batches_bound_each_step() {
        let mut i = input(100, 1, 0);
        i.limits.max_workers = 10;
        i.up_batch = 3;
        assert_eq!(decide(&i), ScaleDecision::Up(3));

        let mut i = input(0, 8, 8);
        i.limits.max_workers = 10;
        i.down_batch = 5;
        assert_eq!(decide(&i), ScaleDecision::Down(5));
        i.current = 4;
        assert_eq!(decide(&i), ScaleDecision::Down(3));
    }

    #[test]
    fn simulated_farm_stays_within_limits() {
        let mut current = 1;
        let mut seen = Vec::new();
        for depth in [25, 25, 25, 25, 0, 0, 0, 0] {
            match decide(&input(depth, current, current)) {
                ScaleDecision::Up(n) => current += n,
                ScaleDecision::Down(n) => current -= n,
                ScaleDecision::Hold => {}
            }
            assert!((1..=3).contains(&current));
            seen.push(current);
        }
        assert_eq!(seen, vec![2, 3, 3, 3, 2, 1, 1, 1]);
    }
}
