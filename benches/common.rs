#![allow(dead_code)]

use std::sync::Arc;

use lockstep::{Algorithm, LaneBatch, Outcome, Policy, SharedValue, StepResult, StepTag, HALT};

pub const WORK_SMALL: usize = 1 << 10;
pub const WORK_MED: usize = 1 << 14;
pub const ROUNDS: u32 = 64;

pub type Lanes = LaneBatch<f32, 8>;

#[derive(Default)]
pub struct Field {
    pub energy: SharedValue<f32>,
}

pub fn energy(f: &Field) -> &SharedValue<f32> {
    &f.energy
}

/// Relaxes its lanes towards zero and folds the total every round.
#[derive(Default)]
pub struct Relax {
    state: Lanes,
    round: u32,
}

impl Algorithm for Relax {
    type Batch = Lanes;
    type Shared = Field;
    type Accumulator = ();
    type Fields = ();
    const SCHEDULE: &'static [Policy] = &[Policy::Separate, Policy::Parallel, Policy::Parallel];

    fn init(&mut self, _shared: &Arc<Field>, _acc: &mut ()) {}

    fn step(&mut self, tag: StepTag, _acc: &mut ()) -> Outcome<Self> {
        match tag.step {
            0 => {
                if let Some(shard) = tag.shard {
                    self.state[shard.local] = (shard.global % 97) as f32;
                }
                StepResult::control(1)
            }
            1 => {
                self.state.apply(|x| x * 0.5);
                StepResult::control(2)
            }
            _ => {
                self.round += 1;
                let next = if self.round < ROUNDS { 1 } else { HALT };
                StepResult::fold(next, self.state, energy)
            }
        }
    }
}
