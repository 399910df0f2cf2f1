use std::env;

fn main() {
    // DEFERQ_CAPACITY, default to 64 events
    println!("cargo:rerun-if-env-changed=DEFERQ_CAPACITY");
    let capacity = env::var("DEFERQ_CAPACITY")
        .unwrap_or("64".to_owned());
    println!("cargo:rustc-env=DEFERQ_CAPACITY={}", capacity);

    // DEFERQ_SLOT_SIZE, default to 64 bytes of inline callable storage
    println!("cargo:rerun-if-env-changed=DEFERQ_SLOT_SIZE");
    let slot_size = env::var("DEFERQ_SLOT_SIZE")
        .unwrap_or("64".to_owned());
    println!("cargo:rustc-env=DEFERQ_SLOT_SIZE={}", slot_size);
}
