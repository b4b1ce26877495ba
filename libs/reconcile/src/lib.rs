//! Node-count reconciliation primitives.
//!
//! This library holds the arithmetic behind data-plane cluster autoscaling.
//! It knows nothing about clusters, registries or providers: callers hand in
//! the node bounds a cluster reported and which capacity thresholds were
//! crossed, and get back a [`ScalingDecision`].
//!
//! # Invariants
//!
//! - Decisions are deterministic given the same inputs
//! - A scale-up never lands above the restricted ceiling
//! - A scale-down never lands below the restricted floor, the workload minimum or zero
//! - Every action moves the node count by exactly one `node_delta`

/// Round `ceiling` down to the nearest multiple of `multiple`.
///
/// A `multiple` of one or less leaves the ceiling untouched.
pub fn restricted_ceiling(ceiling: i32, multiple: i32) -> i32 {
    if multiple <= 1 {
        return ceiling;
    }
    ceiling.saturating_sub(ceiling.rem_euclid(multiple))
}

/// Round `floor` up to the nearest multiple of `multiple`.
///
/// A `multiple` of one or less leaves the floor untouched.
pub fn restricted_floor(floor: i32, multiple: i32) -> i32 {
    if multiple <= 1 {
        return floor;
    }
    match floor.rem_euclid(multiple) {
        0 => floor,
        remainder => floor.saturating_add(multiple - remainder),
    }
}

/// Node counts reported by a cluster for one reconciliation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeBounds {
    /// Compute nodes currently running.
    pub current: i32,

    /// Hard upper bound on compute nodes.
    pub ceiling: i32,

    /// Hard lower bound on compute nodes.
    pub floor: i32,

    /// Fewest nodes able to host the workloads already placed.
    pub workload_minimum: i32,

    /// Nodes added or removed by a single scaling action.
    pub node_delta: i32,
}

/// Which capacity thresholds a cluster crossed this cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapacityPressure {
    /// Remaining capacity can no longer fit one more minimally sized instance.
    pub scale_up_crossed: bool,

    /// Remaining capacity still covers a full scaling increment.
    pub scale_down_crossed: bool,
}

/// Outcome of a node-count reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingDecision {
    /// Grow the cluster to `to` nodes.
    ScaleUp { to: i32 },

    /// Shrink the cluster to `to` nodes.
    ScaleDown { to: i32 },

    /// Leave the node count as it is.
    Hold,
}

impl ScalingDecision {
    /// The node count the cluster should converge to.
    pub fn desired(&self, current: i32) -> i32 {
        match *self {
            Self::ScaleUp { to } | Self::ScaleDown { to } => to,
            Self::Hold => current,
        }
    }

    /// Returns true if this decision grows the cluster.
    pub fn is_scale_up(&self) -> bool {
        matches!(self, Self::ScaleUp { .. })
    }
}

impl NodeBounds {
    /// Node count after one scale-up step, if it fits below the restricted
    /// ceiling.
    ///
    /// Counts that do not fit in an `i32` after the step never scale.
    pub fn scale_up_target(&self, multiple: i32) -> Option<i32> {
        if self.node_delta <= 0 {
            return None;
        }
        let ceiling = restricted_ceiling(self.ceiling, multiple);
        let target = self.current.checked_add(self.node_delta)?;
        (self.current < ceiling && target <= ceiling).then_some(target)
    }

    /// Node count after one scale-down step, if it stays above both lower
    /// bounds and does not go negative.
    pub fn scale_down_target(&self, multiple: i32) -> Option<i32> {
        if self.node_delta <= 0 {
            return None;
        }
        let target = self.current.checked_sub(self.node_delta)?;
        (target >= 0
            && target >= self.workload_minimum
            && target >= restricted_floor(self.floor, multiple))
        .then_some(target)
    }

    /// Returns true if one more scale-up step fits below the restricted ceiling.
    pub fn can_scale_up(&self, multiple: i32) -> bool {
        self.scale_up_target(multiple).is_some()
    }

    /// Returns true if one scale-down step stays above both lower bounds.
    pub fn can_scale_down(&self, multiple: i32) -> bool {
        self.scale_down_target(multiple).is_some()
    }

    /// Returns true if the cluster already sits at or above its restricted ceiling.
    pub fn at_ceiling(&self, multiple: i32) -> bool {
        self.current >= restricted_ceiling(self.ceiling, multiple)
    }
}

/// Decide the next node count for a cluster.
///
/// Scale-up wins when both thresholds report as crossed; the two conditions
/// are exclusive for any consistent report.
pub fn decide(bounds: &NodeBounds, multiple: i32, pressure: CapacityPressure) -> ScalingDecision {
    if pressure.scale_up_crossed {
        if let Some(to) = bounds.scale_up_target(multiple) {
            return ScalingDecision::ScaleUp { to };
        }
    }

    if pressure.scale_down_crossed && !pressure.scale_up_crossed {
        if let Some(to) = bounds.scale_down_target(multiple) {
            return ScalingDecision::ScaleDown { to };
        }
    }

    ScalingDecision::Hold
}

/// Whether a previously requested resize has landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceStatus {
    /// Observed nodes match the requested nodes.
    Converged,

    /// Observed nodes are still moving toward the requested nodes.
    Converging,

    /// The platform did not report one of the two counts.
    Unknown,
}

impl ConvergenceStatus {
    /// Compare the requested node count with the observed one.
    pub fn from_counts(requested: Option<i32>, observed: Option<i32>) -> Self {
        match (requested, observed) {
            (Some(requested), Some(observed)) if requested == observed => Self::Converged,
            (Some(_), Some(_)) => Self::Converging,
            _ => Self::Unknown,
        }
    }

    /// Returns true if the resource is still converging.
    pub fn is_converging(&self) -> bool {
        matches!(self, Self::Converging)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    const MULTI_AZ: i32 = 3;

    fn bounds(current: i32, ceiling: i32, floor: i32, workload_minimum: i32) -> NodeBounds {
        NodeBounds {
            current,
            ceiling,
            floor,
            workload_minimum,
            node_delta: MULTI_AZ,
        }
    }

    const UP: CapacityPressure = CapacityPressure {
        scale_up_crossed: true,
        scale_down_crossed: false,
    };
    const DOWN: CapacityPressure = CapacityPressure {
        scale_up_crossed: false,
        scale_down_crossed: true,
    };
    const NONE: CapacityPressure = CapacityPressure {
        scale_up_crossed: false,
        scale_down_crossed: false,
    };

    #[rstest]
    #[case(10, 3, 9)]
    #[case(9, 3, 9)]
    #[case(5, 3, 3)]
    #[case(2, 3, 0)]
    #[case(7, 1, 7)]
    fn test_restricted_ceiling(#[case] ceiling: i32, #[case] multiple: i32, #[case] want: i32) {
        assert_eq!(restricted_ceiling(ceiling, multiple), want);
    }

    #[rstest]
    #[case(5, 3, 6)]
    #[case(6, 3, 6)]
    #[case(0, 3, 0)]
    #[case(1, 3, 3)]
    #[case(5, 1, 5)]
    fn test_restricted_floor(#[case] floor: i32, #[case] multiple: i32, #[case] want: i32) {
        assert_eq!(restricted_floor(floor, multiple), want);
    }

    #[rstest]
    #[case::scale_up(bounds(3, 10000, 0, 3), UP, 6)]
    #[case::ceiling_rounds_down(bounds(3, 5, 0, 3), UP, 3)]
    #[case::scale_down(bounds(6, 10000, 0, 3), DOWN, 3)]
    #[case::workload_minimum_blocks(bounds(6, 10000, 0, 6), DOWN, 6)]
    #[case::floor_rounds_up(bounds(6, 10000, 5, 3), DOWN, 6)]
    #[case::no_pressure(bounds(12, 30, 3, 3), NONE, 12)]
    fn test_decide(
        #[case] bounds: NodeBounds,
        #[case] pressure: CapacityPressure,
        #[case] want: i32,
    ) {
        let decision = decide(&bounds, MULTI_AZ, pressure);
        assert_eq!(decision.desired(bounds.current), want);
    }

    #[test]
    fn test_zero_delta_never_scales() {
        let b = NodeBounds {
            current: 6,
            ceiling: 0,
            floor: 0,
            workload_minimum: 0,
            node_delta: 0,
        };
        let both = CapacityPressure {
            scale_up_crossed: true,
            scale_down_crossed: true,
        };
        assert_eq!(decide(&b, 1, both), ScalingDecision::Hold);
        assert_eq!(decide(&b, 1, DOWN), ScalingDecision::Hold);
    }

    #[rstest]
    #[case::delta_overflows_up(NodeBounds { current: 3, ceiling: 10, floor: 0, workload_minimum: 0, node_delta: i32::MAX }, UP)]
    #[case::current_near_max(NodeBounds { current: i32::MAX - 1, ceiling: i32::MAX, floor: 0, workload_minimum: 0, node_delta: 3 }, UP)]
    #[case::current_at_min(NodeBounds { current: i32::MIN, ceiling: 10, floor: i32::MIN, workload_minimum: i32::MIN, node_delta: 1 }, DOWN)]
    #[case::negative_target(NodeBounds { current: 2, ceiling: 10, floor: -9, workload_minimum: -9, node_delta: 3 }, DOWN)]
    #[case::ceiling_at_min(NodeBounds { current: 0, ceiling: i32::MIN, floor: 0, workload_minimum: 0, node_delta: 3 }, UP)]
    fn test_extreme_reports_hold(#[case] bounds: NodeBounds, #[case] pressure: CapacityPressure) {
        assert_eq!(decide(&bounds, MULTI_AZ, pressure), ScalingDecision::Hold);
    }

    #[test]
    fn test_restricted_bounds_saturate() {
        assert_eq!(restricted_ceiling(i32::MIN, MULTI_AZ), i32::MIN);
        assert_eq!(restricted_floor(i32::MAX, MULTI_AZ), i32::MAX);
    }

    #[test]
    fn test_convergence_status() {
        assert_eq!(
            ConvergenceStatus::from_counts(Some(6), Some(6)),
            ConvergenceStatus::Converged
        );
        assert!(ConvergenceStatus::from_counts(Some(6), Some(8)).is_converging());
        assert_eq!(
            ConvergenceStatus::from_counts(Some(6), None),
            ConvergenceStatus::Unknown
        );
    }

    proptest! {
        #[test]
        fn scale_up_never_exceeds_ceiling(
            current in 0i32..200,
            ceiling in 0i32..300,
            delta in 1i32..6,
        ) {
            let b = NodeBounds { current, ceiling, floor: 0, workload_minimum: 0, node_delta: delta };
            if let ScalingDecision::ScaleUp { to } = decide(&b, delta, UP) {
                prop_assert!(to <= ceiling);
                prop_assert_eq!(to - current, delta);
            }
        }

        #[test]
        fn scale_down_respects_lower_bounds(
            current in 0i32..200,
            floor in 0i32..100,
            workload_minimum in 0i32..100,
            delta in 1i32..6,
        ) {
            let b = NodeBounds { current, ceiling: 1000, floor, workload_minimum, node_delta: delta };
            if let ScalingDecision::ScaleDown { to } = decide(&b, delta, DOWN) {
                prop_assert!(to >= floor.max(workload_minimum));
                prop_assert_eq!(current - to, delta);
            }
        }

        #[test]
        fn decide_is_total_over_i32(
            current in any::<i32>(),
            ceiling in any::<i32>(),
            floor in any::<i32>(),
            workload_minimum in any::<i32>(),
            node_delta in any::<i32>(),
            multiple in prop_oneof![Just(1i32), Just(3i32)],
            scale_up_crossed in any::<bool>(),
            scale_down_crossed in any::<bool>(),
        ) {
            let b = NodeBounds { current, ceiling, floor, workload_minimum, node_delta };
            let pressure = CapacityPressure { scale_up_crossed, scale_down_crossed };
            match decide(&b, multiple, pressure) {
                ScalingDecision::ScaleUp { to } => {
                    prop_assert!(to > current);
                    prop_assert!(to <= restricted_ceiling(ceiling, multiple));
                    prop_assert_eq!(i64::from(to) - i64::from(current), i64::from(node_delta));
                }
                ScalingDecision::ScaleDown { to } => {
                    prop_assert!(to >= 0 && to < current);
                    prop_assert!(to >= workload_minimum && to >= restricted_floor(floor, multiple));
                    prop_assert_eq!(i64::from(current) - i64::from(to), i64::from(node_delta));
                }
                ScalingDecision::Hold => {}
            }
        }

        #[test]
        fn no_pressure_holds(current in 0i32..200, ceiling in 0i32..300, delta in 0i32..6) {
            let b = NodeBounds { current, ceiling, floor: 0, workload_minimum: 0, node_delta: delta };
            prop_assert_eq!(decide(&b, 3, NONE).desired(current), current);
        }
    }
}
