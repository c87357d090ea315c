fn main() {
    // Re-embed migrations when the SQL changes
    println!("cargo:rerun-if-changed=migrations");
}
