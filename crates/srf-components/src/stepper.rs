//! Stepper-motor tuner: converts requested step counts into cavity detune
//! changes at a bounded rate, one tick at a time, with mid-move abort.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use srf_core::{CavityAddr, Severity, Var};
use tokio::time::sleep;

use crate::cavity::Cavity;
use crate::error::{ComponentError, ComponentResult};
use crate::piezo::{PIEZO_HZ_PER_VOLT, PiezoActuator, PiezoMode};

const DEFAULT_SPEED_STEPS_PER_TICK: i64 = 20_000;

/// Signed direction of a move request; the step count itself is always
/// non-negative.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveDirection {
    Positive,
    Negative,
}

impl MoveDirection {
    pub fn sign(self) -> i64 {
        match self {
            MoveDirection::Positive => 1,
            MoveDirection::Negative => -1,
        }
    }
}

#[derive(Debug)]
struct StepperInner {
    addr: CavityAddr,
    steps_per_hertz: f64,

    step_des: Var<i64>,
    speed: Var<i64>,
    step_tot: Var<i64>,
    step_signed: Var<i64>,
    moving: Var<bool>,
    done: Var<bool>,
    abort_req: Var<bool>,

    cavity: Cavity,
    piezo: PiezoActuator,
}

/// Cheap-clone handle to one stepper tuner, tied 1:1 to a cavity and its
/// piezo.
#[derive(Clone, Debug)]
pub struct StepperMotor {
    inner: Arc<StepperInner>,
}

impl StepperMotor {
    pub fn new(addr: CavityAddr, cavity: Cavity, piezo: PiezoActuator) -> Self {
        let steps_per_hertz = cavity.class().steps_per_hertz();
        Self {
            inner: Arc::new(StepperInner {
                step_des: Var::new(format!("{addr}:STEP:NSTEPS"), 0),
                speed: Var::new(format!("{addr}:STEP:VELO"), DEFAULT_SPEED_STEPS_PER_TICK),
                step_tot: Var::new(format!("{addr}:STEP:REG_TOTABS"), 0),
                step_signed: Var::new(format!("{addr}:STEP:REG_TOTSGN"), 0),
                moving: Var::new(format!("{addr}:STEP:STAT_MOV"), false),
                done: Var::new(format!("{addr}:STEP:STAT_DONE"), true),
                abort_req: Var::new(format!("{addr}:STEP:ABORT_REQ"), false),
                addr,
                steps_per_hertz,
                cavity,
                piezo,
            }),
        }
    }

    pub fn addr(&self) -> &CavityAddr {
        &self.inner.addr
    }

    pub fn steps_per_hertz(&self) -> f64 {
        self.inner.steps_per_hertz
    }

    pub fn requested_steps(&self) -> i64 {
        self.inner.step_des.value()
    }

    pub fn speed(&self) -> i64 {
        self.inner.speed.value()
    }

    pub fn total_steps(&self) -> i64 {
        self.inner.step_tot.value()
    }

    pub fn total_steps_signed(&self) -> i64 {
        self.inner.step_signed.value()
    }

    pub fn is_moving(&self) -> bool {
        self.inner.moving.value()
    }

    pub fn is_done(&self) -> bool {
        self.inner.done.value()
    }

    pub fn moving_var(&self) -> Var<bool> {
        self.inner.moving.clone()
    }

    /// Stage the step count for the next move. Always non-negative; the
    /// direction is carried by the move request itself.
    pub fn set_requested_steps(&self, steps: i64) -> ComponentResult<()> {
        if steps < 0 {
            return Err(ComponentError::InvalidArg {
                what: "requested step count must be non-negative",
            });
        }
        self.inner.step_des.set(steps);
        Ok(())
    }

    pub fn set_speed(&self, steps_per_tick: i64) -> ComponentResult<()> {
        if steps_per_tick <= 0 {
            return Err(ComponentError::InvalidArg {
                what: "stepper speed must be positive",
            });
        }
        self.inner.speed.set(steps_per_tick);
        Ok(())
    }

    /// Zero the absolute and signed step accumulators.
    pub fn reset_counters(&self) {
        self.inner.step_tot.set(0);
        self.inner.step_signed.set(0);
    }

    /// Request cancellation of an in-flight move; observed at the next
    /// tick boundary. No-op while idle.
    pub fn abort(&self) {
        if self.is_moving() {
            self.inner.abort_req.set(true);
        }
    }

    /// Drive the staged step count in the given direction, one
    /// `speed`-sized chunk per tick.
    ///
    /// The detune moves by `speed / steps_per_hertz` Hz per tick (sign
    /// inverted for standard cryomodules), the fractional remainder is
    /// applied after the last whole tick, and a feedback-mode piezo
    /// absorbs the total frequency change as a voltage delta. A concurrent
    /// second move is rejected.
    pub async fn move_motor(&self, direction: MoveDirection) -> ComponentResult<()> {
        if self.is_moving() {
            self.inner.moving.set_severity(Severity::Minor);
            return Err(ComponentError::MoveInProgress);
        }
        self.inner.moving.set_with_severity(true, Severity::NoAlarm);
        self.inner.done.set(false);

        let step_des = self.inner.step_des.value();
        let speed = self.inner.speed.value();
        let sign = direction.sign();
        // Tuner geometry: a positive motor move pulls the frequency down
        // on standard modules.
        let freq_sign = if self.inner.cavity.is_high_loaded() {
            sign
        } else {
            -sign
        };
        let start_detune = self.inner.cavity.detune();
        tracing::info!(stepper = %self.inner.addr, steps = step_des, ?direction, "motor moving");

        let mut steps_done: i64 = 0;
        while step_des - steps_done >= speed && !self.inner.abort_req.value() {
            self.inner.step_tot.modify(|t| *t += speed);
            self.inner.step_signed.modify(|t| *t += sign * speed);
            steps_done += speed;

            let delta_hz = (speed as f64 / self.inner.steps_per_hertz).floor() as i64;
            self.inner
                .cavity
                .set_detune(self.inner.cavity.detune() + freq_sign * delta_hz);

            sleep(Duration::from_secs(1)).await;
        }

        if self.inner.abort_req.value() {
            self.inner.abort_req.set(false);
            self.inner.moving.set(false);
            tracing::info!(stepper = %self.inner.addr, steps_done, "move aborted");
            return Ok(());
        }

        let remainder = step_des - steps_done;
        self.inner.step_tot.modify(|t| *t += remainder);
        self.inner.step_signed.modify(|t| *t += sign * remainder);
        let delta_hz = (remainder as f64 / self.inner.steps_per_hertz).floor() as i64;
        self.inner
            .cavity
            .set_detune(self.inner.cavity.detune() + freq_sign * delta_hz);

        let freq_change = self.inner.cavity.detune() - start_detune;
        if self.inner.piezo.is_enabled() && self.inner.piezo.feedback_mode() == PiezoMode::Feedback
        {
            self.inner
                .piezo
                .nudge_voltage(freq_change as f64 / PIEZO_HZ_PER_VOLT);
        }

        self.inner.moving.set(false);
        self.inner.done.set(true);
        tracing::info!(stepper = %self.inner.addr, freq_change_hz = freq_change, "move done");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cavity::CryomoduleClass;

    fn rig(class: CryomoduleClass) -> (StepperMotor, Cavity, PiezoActuator) {
        let addr = CavityAddr::new("04", 5);
        let cavity = Cavity::new(addr.clone(), class).with_initial_detune(0);
        let piezo = PiezoActuator::new(addr.clone());
        let stepper = StepperMotor::new(addr, cavity.clone(), piezo.clone());
        (stepper, cavity, piezo)
    }

    #[tokio::test(start_paused = true)]
    async fn uninterrupted_move_lands_n_over_k() {
        let (stepper, cavity, _pzt) = rig(CryomoduleClass::Standard);
        stepper.set_requested_steps(50_000).unwrap();
        stepper.move_motor(MoveDirection::Positive).await.unwrap();

        // 2 whole ticks of 20k steps plus a 10k remainder; standard
        // modules move down in frequency on a positive request.
        let k = CryomoduleClass::Standard.steps_per_hertz();
        let per_tick = (20_000.0 / k).floor() as i64;
        let tail = (10_000.0 / k).floor() as i64;
        assert_eq!(cavity.detune(), -(2 * per_tick + tail));

        // Within one tick's rounding of the ideal N/k.
        let ideal = 50_000.0 / k;
        assert!(((-cavity.detune()) as f64 - ideal).abs() < 20_000.0 / k);

        assert_eq!(stepper.total_steps_signed(), 50_000);
        assert_eq!(stepper.total_steps(), 50_000);
        assert!(stepper.is_done());
        assert!(!stepper.is_moving());
    }

    #[tokio::test(start_paused = true)]
    async fn high_loaded_moves_frequency_with_the_motor() {
        let (stepper, cavity, _pzt) = rig(CryomoduleClass::HighLoaded);
        stepper.set_requested_steps(14_000).unwrap();
        stepper.set_speed(14_000).unwrap();
        stepper.move_motor(MoveDirection::Positive).await.unwrap();
        assert!(cavity.detune() > 0);
        assert_eq!(stepper.total_steps_signed(), 14_000);
    }

    #[tokio::test(start_paused = true)]
    async fn negative_move_flips_both_counters_and_frequency() {
        let (stepper, cavity, _pzt) = rig(CryomoduleClass::Standard);
        stepper.set_requested_steps(40_000).unwrap();
        stepper.move_motor(MoveDirection::Negative).await.unwrap();
        assert_eq!(stepper.total_steps_signed(), -40_000);
        assert_eq!(stepper.total_steps(), 40_000);
        assert!(cavity.detune() > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn second_move_is_rejected_while_in_flight() {
        let (stepper, _cavity, _pzt) = rig(CryomoduleClass::Standard);
        stepper.set_requested_steps(100_000).unwrap();

        let first = tokio::spawn({
            let stepper = stepper.clone();
            async move { stepper.move_motor(MoveDirection::Positive).await }
        });
        tokio::task::yield_now().await;
        assert!(stepper.is_moving());

        let err = stepper.move_motor(MoveDirection::Positive).await.unwrap_err();
        assert_eq!(err, ComponentError::MoveInProgress);
        assert_eq!(stepper.moving_var().severity(), Severity::Minor);

        first.await.unwrap().unwrap();
        assert_eq!(stepper.total_steps_signed(), 100_000);
    }

    #[tokio::test(start_paused = true)]
    async fn abort_stops_at_completed_ticks() {
        let (stepper, _cavity, pzt) = rig(CryomoduleClass::Standard);
        let voltage_before = pzt.voltage();
        stepper.set_requested_steps(100_000).unwrap();

        let task = tokio::spawn({
            let stepper = stepper.clone();
            async move { stepper.move_motor(MoveDirection::Positive).await }
        });

        // Let two whole ticks elapse, then abort during the third wait.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        stepper.abort();
        task.await.unwrap().unwrap();

        assert_eq!(stepper.total_steps_signed(), 2 * 20_000);
        assert!(!stepper.is_moving());
        assert!(!stepper.is_done());
        // No piezo nudge on an aborted move.
        assert_eq!(pzt.voltage(), voltage_before);

        // The flag was consumed; an idle abort stays a no-op.
        stepper.abort();
        stepper.set_requested_steps(0).unwrap();
        stepper.move_motor(MoveDirection::Positive).await.unwrap();
        assert!(stepper.is_done());
    }

    #[tokio::test(start_paused = true)]
    async fn feedback_piezo_absorbs_total_frequency_change() {
        let (stepper, cavity, pzt) = rig(CryomoduleClass::Standard);
        pzt.set_voltage(17.0).unwrap();
        stepper.set_requested_steps(36_571).unwrap();
        stepper.move_motor(MoveDirection::Positive).await.unwrap();

        let freq_change = cavity.detune() as f64;
        let expected = 17.0 + freq_change / PIEZO_HZ_PER_VOLT;
        assert!((pzt.voltage() - expected).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_mode_piezo_is_left_alone() {
        let (stepper, _cavity, pzt) = rig(CryomoduleClass::Standard);
        pzt.set_feedback_mode(PiezoMode::Manual);
        stepper.set_requested_steps(20_000).unwrap();
        stepper.move_motor(MoveDirection::Positive).await.unwrap();
        assert_eq!(pzt.voltage(), 17.0);
    }

    #[test]
    fn rejects_negative_step_request_and_bad_speed() {
        let (stepper, _cavity, _pzt) = rig(CryomoduleClass::Standard);
        assert!(stepper.set_requested_steps(-1).is_err());
        assert!(stepper.set_speed(0).is_err());
    }

    #[test]
    fn counter_reset() {
        let (stepper, _cavity, _pzt) = rig(CryomoduleClass::Standard);
        stepper.inner.step_tot.set(123);
        stepper.inner.step_signed.set(-123);
        stepper.reset_counters();
        assert_eq!(stepper.total_steps(), 0);
        assert_eq!(stepper.total_steps_signed(), 0);
    }
}
