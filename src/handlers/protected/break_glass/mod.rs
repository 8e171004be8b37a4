// Break-glass endpoints. Two activation variants coexist on purpose:
// /activate (self-elevation) and /promote (delegated promotion of a
// designated faculty member).

pub mod activate;
pub mod deactivate;
pub mod promote;
pub mod status;

pub use activate::activate_post;
pub use deactivate::deactivate_post;
pub use promote::promote_post;
pub use status::status_get;
