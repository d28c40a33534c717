/// Router Module Index
///
/// Splits the API by access level. Each module is guarded at the layer level
/// in `create_router`, so a handler cannot end up exposed with a weaker guard
/// than its module.

/// Routes open to anonymous callers: health, sign-in and listing reads.
pub mod public;

/// Routes behind `auth_middleware`. Role and ownership are checked in the handlers.
pub mod authenticated;

/// Routes behind `admin_middleware`.
pub mod admin;
