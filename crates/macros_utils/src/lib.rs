//! Small declarative helpers shared across the workspace.

/// Generate a `routes` function registering the listed handlers.
///
/// Each entry is a handler produced by one of actix-web's route attribute
/// macros (`#[get(..)]`, `#[post(..)]`, ...).
///
/// ```ignore
/// macros_utils::routes! {
///     route list_jobs,
///     route create_job,
/// }
/// ```
#[cfg(feature = "actix")]
#[macro_export]
macro_rules! routes {
    ($(route $handler:ident),* $(,)?) => {
        pub fn routes(cfg: &mut ::actix_web::web::ServiceConfig) {
            $( cfg.service($handler); )*
        }
    };
}
