//! Demo value set served by the agent
//!
//! A simulated drivetrain: tunable setpoints and gains, and a step function
//! that moves the measured speed toward the target with a PI controller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;
use tuning_lib::{Property, ScopeDescriptor, ValueDescriptor};

/// PI controller gains
#[derive(Clone)]
pub struct PidGains {
    pub kp: Property<f64>,
    pub ki: Property<f64>,
    pub kd: Property<f64>,
}

/// Tunable values and simulated state of one drivetrain
#[derive(Clone)]
pub struct Drivetrain {
    pub target_speed: Property<f64>,
    pub max_current: Property<i32>,
    pub brake_enabled: Property<bool>,
    pub gains: PidGains,
    /// Simulated measurement; published read-only
    pub measured_speed: Property<f64>,
    integrator: Property<f64>,
    reset_requested: Arc<AtomicBool>,
}

impl Default for Drivetrain {
    fn default() -> Self {
        Self::new()
    }
}

impl Drivetrain {
    pub fn new() -> Self {
        Self {
            target_speed: Property::new(10.0),
            max_current: Property::new(40),
            brake_enabled: Property::new(false),
            gains: PidGains {
                kp: Property::new(0.4),
                ki: Property::new(0.05),
                kd: Property::new(0.0),
            },
            measured_speed: Property::new(0.0),
            integrator: Property::new(0.0),
            reset_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Binding table for this drivetrain
    pub fn scope(&self) -> ScopeDescriptor {
        let speed = self.target_speed.clone();
        let reset = self.reset_requested.clone();

        let pid = ScopeDescriptor::new("Pid")
            .value(ValueDescriptor::new("kP", &self.gains.kp).callback("resetIntegrator"))
            .value(ValueDescriptor::new("kI", &self.gains.ki).callback("resetIntegrator"))
            .value(ValueDescriptor::new("kD", &self.gains.kd))
            .callback("resetIntegrator", move || {
                reset.store(true, Ordering::Relaxed);
                Ok(())
            });

        ScopeDescriptor::new("Drivetrain")
            .value(ValueDescriptor::new("targetSpeed", &self.target_speed).callback("logTarget"))
            .value(ValueDescriptor::new("maxCurrent", &self.max_current))
            .value(ValueDescriptor::new("brakeEnabled", &self.brake_enabled))
            .value(ValueDescriptor::new("measuredSpeed", &self.measured_speed).read_only())
            .callback("logTarget", move || {
                info!(target_speed = speed.get(), "Target speed retuned");
                Ok(())
            })
            .child(pid)
    }

    /// Advance the simulation by `dt` seconds
    pub fn step(&self, dt: f64) {
        if self.reset_requested.swap(false, Ordering::Relaxed) {
            self.integrator.set(0.0);
        }

        let measured = self.measured_speed.get();
        if self.brake_enabled.get() {
            self.integrator.set(0.0);
            self.measured_speed.set(measured * (1.0 - (4.0 * dt).min(1.0)));
            return;
        }

        let error = self.target_speed.get() - measured;
        let integral = self.integrator.get() + error * dt;
        self.integrator.set(integral);

        let limit = f64::from(self.max_current.get().max(0));
        let effort = (self.gains.kp.get() * error + self.gains.ki.get() * integral)
            .clamp(-limit, limit);

        self.measured_speed.set(measured + effort * dt);
    }
}
