pub mod form;
pub mod html;
pub mod pdf;
