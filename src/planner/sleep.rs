//! How long to wait before the next poll cycle.

use std::time::Duration;

use rand::Rng;

use crate::api::types::{Meta, Unit};
use crate::pacing::{WAKE_MARGIN_SECS, uniform_secs};

/// Why the agent wakes up when it does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    FreeClaim,
    UnitReturns,
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepPlan {
    pub duration: Duration,
    pub reason: WakeReason,
}

/// Sleep until just after the earliest predicted event, or a random idle
/// period when nothing is pending.
pub fn plan_sleep<R: Rng + ?Sized>(
    rng: &mut R,
    now_ms: i64,
    meta: &Meta,
    units: &[Unit],
    idle_secs: (u64, u64),
) -> SleepPlan {
    let free_claim = (meta.free_gacha_next_claim > now_ms)
        .then_some((meta.free_gacha_next_claim, WakeReason::FreeClaim));
    let unit_return = units
        .iter()
        .map(|u| u.unlock_at)
        .filter(|&at| at > now_ms)
        .min()
        .map(|at| (at, WakeReason::UnitReturns));

    // Ties go to the free claim.
    let next = match (free_claim, unit_return) {
        (Some(a), Some(b)) => Some(if b.0 < a.0 { b } else { a }),
        (a, b) => a.or(b),
    };

    match next {
        Some((at, reason)) => {
            let until = Duration::from_millis((at - now_ms).max(0) as u64);
            SleepPlan {
                duration: until + uniform_secs(rng, WAKE_MARGIN_SECS),
                reason,
            }
        }
        None => SleepPlan {
            duration: uniform_secs(rng, (idle_secs.0 as f64, idle_secs.1 as f64)),
            reason: WakeReason::Idle,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::unit;

    const T: i64 = 1_700_000_000_000;

    fn away_until(at: i64) -> Unit {
        Unit {
            unlock_at: at,
            ..unit("bonk", "universal", 10, 2)
        }
    }

    #[test]
    fn test_earliest_event_plus_margin() {
        let meta = Meta {
            free_gacha_next_claim: T + 5_000,
            ..Default::default()
        };
        let units = [away_until(T + 10_000)];
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let plan = plan_sleep(&mut rng, T, &meta, &units, (600, 3600));
            assert_eq!(plan.reason, WakeReason::FreeClaim);
            assert!(plan.duration >= Duration::from_secs(65));
            assert!(plan.duration <= Duration::from_secs(185));
        }
    }

    #[test]
    fn test_unit_return_wins_when_sooner() {
        let meta = Meta {
            free_gacha_next_claim: T + 3_600_000,
            ..Default::default()
        };
        let units = [away_until(T + 120_000), away_until(T - 1)];
        let plan = plan_sleep(&mut rand::thread_rng(), T, &meta, &units, (600, 3600));
        assert_eq!(plan.reason, WakeReason::UnitReturns);
        assert!(plan.duration >= Duration::from_secs(180));
        assert!(plan.duration <= Duration::from_secs(300));
    }

    #[test]
    fn test_idle_when_nothing_pending() {
        let meta = Meta {
            free_gacha_next_claim: T,
            ..Default::default()
        };
        let units = [away_until(T - 60_000)];
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let plan = plan_sleep(&mut rng, T, &meta, &units, (600, 3600));
            assert_eq!(plan.reason, WakeReason::Idle);
            assert!(plan.duration >= Duration::from_secs(600));
            assert!(plan.duration <= Duration::from_secs(3600));
        }
    }

    #[test]
    fn test_degenerate_idle_range() {
        let plan = plan_sleep(
            &mut rand::thread_rng(),
            T,
            &Meta::default(),
            &[],
            (900, 900),
        );
        assert_eq!(plan.duration, Duration::from_secs(900));
    }
}
