pub fn print(name: &str) {
    println!("delete: OK (name='{}')", name);
}
