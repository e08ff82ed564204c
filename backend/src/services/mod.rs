pub mod gemini;
pub mod studio;
pub mod translator;
