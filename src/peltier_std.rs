use crate::control_loop::PeltierDrive;
use crate::log::*;
use portable_atomic::{AtomicU8, Ordering};

pub type Drive = SimulatedPeltier;

/// Duty seen by the thermal simulation.
pub static SIMULATED_DUTY: AtomicU8 = AtomicU8::new(0);

pub struct SimulatedPeltier;

impl PeltierDrive for SimulatedPeltier {
    fn set_duty(&mut self, duty: u8) {
        let previous = SIMULATED_DUTY.swap(duty, Ordering::Relaxed);
        if previous != duty {
            debug!("Peltier duty {} -> {}", previous, duty);
        }
    }
}
