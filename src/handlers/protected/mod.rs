// Protected handlers (JWT authentication required), mounted under /api/*.

pub mod audit;
pub mod break_glass;
pub mod users;
