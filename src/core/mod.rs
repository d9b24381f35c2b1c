// Core modules implementing the row model, projection, selection, and errors.
pub mod action;
pub mod error;
pub mod row;
pub mod selection;
pub mod view;
