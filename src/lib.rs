pub mod form;
pub mod i18n;
pub mod id;
pub mod prelude;

pub use form::{FormController, FormError, FormOptions, FormResult};
