//! Variable context and template rendering for deckhand
//!
//! This crate holds the data side of a deployment run:
//!
//! - [`Value`] and [`Vars`], the layered variable context built per host
//! - [`Renderer`], Jinja templates compiled by `minijinja` with strict
//!   undefined handling
//! - [`Expr`], task guards written in the template expression language
//!
//! Rendering is a pure function of the template and the context: the same
//! inputs always produce byte-identical output.
//!
//! # Example
//!
//! ```
//! use stencil::{Renderer, Vars};
//!
//! let mut renderer = Renderer::new();
//! renderer.add(
//!     "site.conf",
//!     "server_name{% for d in domains %} {{ d }}{% endfor %};\n",
//! );
//!
//! let mut vars = Vars::new();
//! vars.insert("domains", vec!["example.org", "www.example.org"]);
//!
//! let out = renderer.render("site.conf", &vars).unwrap();
//! assert_eq!(out, b"server_name example.org www.example.org;\n");
//! ```

pub mod error;
pub mod expr;
pub mod renderer;
pub mod value;
pub mod vars;

pub use error::{Error, Result};
pub use expr::Expr;
pub use renderer::Renderer;
pub use value::Value;
pub use vars::Vars;
