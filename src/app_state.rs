use crate::controller::AtmController;

#[derive(Clone)]
pub struct AppState {
    pub controller: AtmController,
}
