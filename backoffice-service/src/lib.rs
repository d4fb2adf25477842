//! Back-office service: stock items, customers and invoices that keep
//! on-hand quantities consistent with what has been invoiced.

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod startup;
