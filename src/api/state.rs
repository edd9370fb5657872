use crate::scheduler::NightlyRunner;

#[derive(Clone)]
pub struct AppState {
    pub runner: NightlyRunner,
}
