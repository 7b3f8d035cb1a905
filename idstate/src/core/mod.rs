// Core identity state machinery
pub mod identity;
