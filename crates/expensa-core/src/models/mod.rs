//! Data models for the expense service.
//!
//! - `User`, `LoginRequest`, `RegisterRequest`, `TokenPair`: account and credential types
//! - `Expense`, `Category`, `ExpenseReport`: tracked spending
//! - Input types for the list queries and the expense mutations

pub mod auth;
pub mod expense;

pub use auth::{LoginRequest, LoginResponse, RegisterRequest, TokenPair, User};
pub use expense::{
    totals_by_category, CategoriesInput, Category, CreateExpenseInput, Expense, ExpenseReport,
    ExpensesInput, UpdateExpenseInput, DEFAULT_PAGE_SIZE,
};
