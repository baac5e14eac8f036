use crate::ecu::Instance;
use crate::procfs::{ProcessTicks, SystemTicks};

/// One set of counter values captured at a single tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawSnapshot {
    pub process: ProcessTicks,
    pub system: SystemTicks,
    pub resident_kb: u64,
}

/// Ticks accumulated between two consecutive samples, plus resident memory.
///
/// Deltas stay raw rather than pre-normalized: the instance profile needed
/// for compute-unit scaling is fetched asynchronously and may not exist yet
/// when a sample is taken, so normalization is left to the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measure {
    /// Process user-mode ticks spent this interval.
    pub user: u64,
    /// Process kernel-mode ticks spent this interval.
    pub system: u64,
    /// Machine-wide user-mode ticks spent this interval.
    pub user_total: u64,
    /// Machine-wide kernel-mode ticks spent this interval.
    pub system_total: u64,
    /// Machine-wide idle ticks spent this interval.
    pub idle_total: u64,
    /// Resident memory in kB at the end of the interval.
    pub memory_kb: u64,
}

impl Measure {
    /// Difference between two consecutive snapshots.
    ///
    /// Counters may reset when the monitored process restarts; subtraction
    /// wraps rather than guessing at a correction, matching the unsigned
    /// counter semantics of the source.
    pub fn between(prev: &RawSnapshot, curr: &RawSnapshot) -> Self {
        Self {
            user: curr.process.user.wrapping_sub(prev.process.user),
            system: curr.process.system.wrapping_sub(prev.process.system),
            user_total: curr.system.user.wrapping_sub(prev.system.user),
            system_total: curr.system.system.wrapping_sub(prev.system.system),
            idle_total: curr.system.idle.wrapping_sub(prev.system.idle),
            memory_kb: curr.resident_kb,
        }
    }

    /// Total jiffies spent machine-wide between the two ticks.
    pub fn total(&self) -> u64 {
        self.user_total
            .saturating_add(self.system_total)
            .saturating_add(self.idle_total)
    }

    /// Percentage of machine CPU time this process spent in user mode.
    pub fn user_percent(&self) -> f64 {
        self.percent_of_total(self.user)
    }

    /// Percentage of machine CPU time this process spent in the kernel.
    pub fn system_percent(&self) -> f64 {
        self.percent_of_total(self.system)
    }

    /// Percentage of machine CPU time spent idling.
    pub fn idle_percent(&self) -> f64 {
        self.percent_of_total(self.idle_total)
    }

    fn percent_of_total(&self, delta: u64) -> f64 {
        let total = self.total();
        if total == 0 {
            // An empty interval yields 0%, never NaN.
            return 0.0;
        }
        100.0 * delta as f64 / total as f64
    }

    /// User-mode CPU time in compute units, assuming the process runs on a
    /// machine of the given instance type. NaN when the type is unknown.
    pub fn user_compute_units(&self, instance: Option<&Instance>) -> f64 {
        match instance {
            Some(instance) => self.scale_by(self.user, instance),
            None => f64::NAN,
        }
    }

    /// Kernel-mode CPU time in compute units, assuming the process runs on a
    /// machine of the given instance type. NaN when the type is unknown.
    pub fn system_compute_units(&self, instance: Option<&Instance>) -> f64 {
        match instance {
            Some(instance) => self.scale_by(self.system, instance),
            None => f64::NAN,
        }
    }

    // Ratings are stored x10 so fractional units stay integral; divide the
    // factor back out here.
    fn scale_by(&self, delta: u64, instance: &Instance) -> f64 {
        instance.compute_units_x10 as f64 * delta as f64 / (self.total() as f64 * 10.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecu;

    fn snapshot(
        user: u64,
        system: u64,
        sys_user: u64,
        sys_system: u64,
        sys_idle: u64,
        resident_kb: u64,
    ) -> RawSnapshot {
        RawSnapshot {
            process: ProcessTicks { user, system },
            system: SystemTicks {
                user: sys_user,
                system: sys_system,
                idle: sys_idle,
            },
            resident_kb,
        }
    }

    #[test]
    fn test_between_takes_per_field_deltas() {
        let prev = snapshot(100, 50, 1000, 500, 2000, 400);
        let curr = snapshot(152, 89, 1152, 689, 2100, 534);

        let m = Measure::between(&prev, &curr);
        assert_eq!(m.user, 52);
        assert_eq!(m.system, 39);
        assert_eq!(m.user_total, 152);
        assert_eq!(m.system_total, 189);
        assert_eq!(m.idle_total, 100);
        // Memory is a point-in-time figure, not a delta.
        assert_eq!(m.memory_kb, 534);
    }

    #[test]
    fn test_between_wraps_on_counter_regression() {
        let prev = snapshot(100, 0, 0, 0, 0, 0);
        let curr = snapshot(40, 0, 0, 0, 0, 0);

        let m = Measure::between(&prev, &curr);
        assert_eq!(m.user, 40u64.wrapping_sub(100));
    }

    #[test]
    fn test_percentages() {
        let m = Measure::between(
            &snapshot(100, 50, 1000, 500, 2000, 0),
            &snapshot(152, 89, 1152, 689, 2100, 0),
        );

        assert_eq!(m.total(), 441);
        assert!((m.user_percent() - 100.0 * 52.0 / 441.0).abs() < 1e-9);
        assert!((m.system_percent() - 100.0 * 39.0 / 441.0).abs() < 1e-9);
        assert!((m.idle_percent() - 100.0 * 100.0 / 441.0).abs() < 1e-9);
    }

    #[test]
    fn test_percentages_zero_total() {
        let m = Measure::between(&snapshot(5, 5, 7, 8, 9, 0), &snapshot(9, 9, 7, 8, 9, 0));

        assert_eq!(m.total(), 0);
        assert_eq!(m.user_percent(), 0.0);
        assert_eq!(m.system_percent(), 0.0);
        assert_eq!(m.idle_percent(), 0.0);
    }

    #[test]
    fn test_compute_units_without_instance() {
        let m = Measure::between(&snapshot(0, 0, 0, 0, 0, 0), &snapshot(10, 5, 50, 30, 20, 0));

        assert!(m.user_compute_units(None).is_nan());
        assert!(m.system_compute_units(None).is_nan());
    }

    #[test]
    fn test_compute_units_scaling() {
        // 1000 of 1000 total ticks on a 6.5-unit machine: the full rating.
        let m = Measure {
            user: 1000,
            system: 500,
            user_total: 600,
            system_total: 300,
            idle_total: 100,
            memory_kb: 0,
        };
        let instance = ecu::lookup_name("m2.xlarge").expect("known type");
        assert_eq!(instance.compute_units_x10, 65);

        assert!((m.user_compute_units(Some(instance)) - 6.5).abs() < 1e-9);
        assert!((m.system_compute_units(Some(instance)) - 3.25).abs() < 1e-9);
    }
}
