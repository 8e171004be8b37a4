// Two security tiers: public (no auth, /auth/*) and protected
// (JWT required, /api/*).

pub mod protected;
pub mod public;
