//! Static EC2 instance data for compute-unit normalization.

pub mod metadata;

use std::collections::HashMap;
use std::sync::LazyLock;

/// Representative information about one EC2 instance type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Instance {
    pub api_name: &'static str,
    pub memory_gb: f64,
    /// Compute-unit rating, stored x10 because many ratings are fractional.
    pub compute_units_x10: i64,
    pub cores: u32,
    pub ecu_per_core: f64,
    pub burstable: bool,
}

const fn inst(
    api_name: &'static str,
    memory_gb: f64,
    compute_units_x10: i64,
    cores: u32,
    ecu_per_core: f64,
    burstable: bool,
) -> Instance {
    Instance {
        api_name,
        memory_gb,
        compute_units_x10,
        cores,
        ecu_per_core,
        burstable,
    }
}

// Data from http://www.ec2instances.info
static INSTANCES: &[Instance] = &[
    inst("c1.medium", 1.7, 50, 2, 2.5, false),
    inst("c1.xlarge", 7.0, 200, 8, 2.5, false),
    inst("c3.2xlarge", 15.0, 280, 8, 3.5, false),
    inst("c3.4xlarge", 30.0, 550, 16, 3.438, false),
    inst("c3.8xlarge", 60.0, 1080, 32, 3.375, false),
    inst("c3.large", 3.75, 70, 2, 3.5, false),
    inst("c3.xlarge", 7.5, 140, 4, 3.5, false),
    inst("c4.2xlarge", 15.0, 310, 8, 3.875, false),
    inst("c4.4xlarge", 30.0, 620, 16, 3.875, false),
    inst("c4.8xlarge", 60.0, 1320, 36, 3.667, false),
    inst("c4.large", 3.75, 80, 2, 4.0, false),
    inst("c4.xlarge", 7.5, 160, 4, 4.0, false),
    inst("cc2.8xlarge", 60.5, 880, 32, 2.75, false),
    inst("cg1.4xlarge", 22.5, 335, 16, 2.094, false),
    inst("cr1.8xlarge", 244.0, 880, 32, 2.75, false),
    inst("d2.2xlarge", 61.0, 280, 8, 3.5, false),
    inst("d2.4xlarge", 122.0, 560, 16, 3.5, false),
    inst("d2.8xlarge", 244.0, 1160, 36, 3.222, false),
    inst("d2.xlarge", 30.5, 140, 4, 3.5, false),
    inst("g2.2xlarge", 15.0, 260, 8, 3.25, false),
    inst("g2.8xlarge", 60.0, 1040, 32, 3.25, false),
    inst("hi1.4xlarge", 60.5, 350, 16, 2.188, false),
    inst("hs1.8xlarge", 117.0, 350, 17, 2.059, false),
    inst("i2.2xlarge", 61.0, 270, 8, 3.375, false),
    inst("i2.4xlarge", 122.0, 530, 16, 3.312, false),
    inst("i2.8xlarge", 244.0, 1040, 32, 3.25, false),
    inst("i2.xlarge", 30.5, 140, 4, 3.5, false),
    inst("m1.large", 7.5, 40, 2, 2.0, false),
    inst("m1.medium", 3.75, 20, 1, 2.0, false),
    inst("m1.small", 1.7, 10, 1, 1.0, false),
    inst("m1.xlarge", 15.0, 80, 4, 2.0, false),
    inst("m2.2xlarge", 34.2, 130, 4, 3.25, false),
    inst("m2.4xlarge", 68.4, 260, 8, 3.25, false),
    inst("m2.xlarge", 17.1, 65, 2, 3.25, false),
    inst("m3.2xlarge", 30.0, 260, 8, 3.25, false),
    inst("m3.large", 7.5, 65, 2, 3.25, false),
    inst("m3.medium", 3.75, 30, 1, 3.0, false),
    inst("m3.xlarge", 15.0, 130, 4, 3.25, false),
    inst("m4.10xlarge", 160.0, 1245, 40, 3.112, false),
    inst("m4.2xlarge", 32.0, 260, 8, 3.25, false),
    inst("m4.4xlarge", 64.0, 535, 16, 3.344, false),
    inst("m4.large", 8.0, 65, 2, 3.25, false),
    inst("m4.xlarge", 16.0, 130, 4, 3.25, false),
    inst("r3.2xlarge", 61.0, 260, 8, 3.25, false),
    inst("r3.4xlarge", 122.0, 520, 16, 3.25, false),
    inst("r3.8xlarge", 244.0, 1040, 32, 3.25, false),
    inst("r3.large", 15.25, 65, 2, 3.25, false),
    inst("r3.xlarge", 30.5, 130, 4, 3.25, false),
    inst("t1.micro", 0.613, 1, 1, 1.0, true),
    inst("t2.large", 8.0, 2, 2, 1.0, true),
    inst("t2.medium", 4.0, 2, 2, 1.0, true),
    inst("t2.micro", 1.0, 1, 1, 1.0, true),
    inst("t2.small", 2.0, 1, 1, 1.0, true),
];

static BY_NAME: LazyLock<HashMap<&'static str, &'static Instance>> =
    LazyLock::new(|| INSTANCES.iter().map(|i| (i.api_name, i)).collect());

/// Look up an instance profile by its API name.
pub fn lookup_name(name: &str) -> Option<&'static Instance> {
    BY_NAME.get(name).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_type() {
        let instance = lookup_name("m2.xlarge").expect("known type");
        assert_eq!(instance.api_name, "m2.xlarge");
        assert_eq!(instance.compute_units_x10, 65);
        assert_eq!(instance.cores, 2);
        assert!(!instance.burstable);
    }

    #[test]
    fn test_lookup_burstable_type() {
        let instance = lookup_name("t2.micro").expect("known type");
        assert!(instance.burstable);
        assert_eq!(instance.compute_units_x10, 1);
    }

    #[test]
    fn test_lookup_unknown_type() {
        assert!(lookup_name("warp9.xxlarge").is_none());
        assert!(lookup_name("").is_none());
    }

    #[test]
    fn test_table_has_no_duplicate_names() {
        assert_eq!(BY_NAME.len(), INSTANCES.len());
    }
}
