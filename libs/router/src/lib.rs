//! Switchboard Router - URL patterns to logical targets
//!
//! Patterns are made of literal segments, `*` wildcards and `:name`
//! parameters. A match returns the route's target with parameter
//! placeholders filled in.
//!
//! ```
//! use serde_json::json;
//! use switchboard_router::Router;
//!
//! let mut router = Router::new();
//! router
//!     .add("/modules/:name/:id", json!(["module", "select", [":name", ":id"]]))
//!     .unwrap();
//!
//! let matched = router.resolve("/modules/simple/6").unwrap();
//! assert_eq!(matched.target, json!(["module", "select", ["simple", "6"]]));
//! ```

pub mod pattern;
pub mod redirect;
pub mod router;

pub use pattern::{Params, Pattern, Segment};
pub use redirect::{redirect, redirect_with_status, Redirect};
pub use router::{Match, Route, Router};
