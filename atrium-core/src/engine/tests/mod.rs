
mod compensation;
mod permissions;
mod quota_files;
mod sweep;
