pub mod approval;
pub mod department;
pub mod meeting;
pub mod role;
pub mod session;
pub mod user;
pub mod workflow;
