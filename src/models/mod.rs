pub mod candidate;
pub mod department;
pub mod employee;
pub mod rbac;
pub mod user;
