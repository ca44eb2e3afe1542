pub mod why;
