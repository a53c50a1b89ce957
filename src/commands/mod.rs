pub mod apply;
pub mod db;
pub mod init;
pub mod machine;
pub mod site;
