/// Router Module Index
///
/// Splits the forum's routes by access level. Access control is applied per
/// module with an axum route layer, so a protected endpoint cannot be exposed
/// by forgetting an extractor.

/// Routes accessible to anonymous clients: registration, sign-in and reads.
pub mod public;

/// Routes behind the `AuthUser` route layer. Owner-only handlers additionally
/// run the authorization guard against the entity or account they touch.
pub mod authenticated;
