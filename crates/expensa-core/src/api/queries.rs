//! GraphQL documents sent to the expense server.
//!
//! Each constant pairs with the top-level response field the client reads.

pub const LOGIN: &str = r#"
mutation Login($input: LoginInput!) {
  login(input: $input) {
    status
    token
    refreshToken
  }
}"#;

/// The server names the variable `accessToken` but expects the refresh token in it.
pub const REFRESH_TOKEN: &str = r#"
mutation RefreshToken($accessToken: String!) {
  refreshToken(accessToken: $accessToken) {
    status
    token
    refreshToken
  }
}"#;

pub const REGISTER: &str = r#"
mutation Register($input: RegisterInput!) {
  register(input: $input) {
    userName
    email
    id
  }
}"#;

pub const EXPENSES: &str = r#"
query Expenses($input: ExpensesInput!) {
  expenses(input: $input) {
    id
    title
    amount
    date
    categoryId
    category {
      id
      name
    }
    notes
    userId
  }
}"#;

pub const EXPENSES_REPORT: &str = r#"
query ExpensesReport($input: ExpensesInput!) {
  expensesReport(input: $input) {
    amount
    category
    userName
    date
  }
}"#;

pub const CATEGORIES: &str = r#"
query Categories($input: CategoriesInput) {
  categories(input: $input) {
    id
    name
  }
}"#;

pub const CREATE_EXPENSE: &str = r#"
mutation CreateExpense($input: CreateExpenseInput!) {
  createExpense(input: $input) {
    id
    title
    amount
    date
    category {
      name
      id
    }
    notes
    userId
  }
}"#;

pub const UPDATE_EXPENSE: &str = r#"
mutation UpdateExpense($input: UpdateExpenseInput!) {
  updateExpense(input: $input) {
    title
    amount
    date
    category {
      id
      name
    }
    notes
    userId
  }
}"#;

pub const REMOVE_EXPENSE: &str = r#"
mutation RemoveExpense($id: ID!) {
  removeExpense(id: $id) {
    title
    amount
    date
    category {
      id
      name
    }
    notes
    userId
  }
}"#;
