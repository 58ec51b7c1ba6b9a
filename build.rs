//! Build script to track include_str! dependencies.
//! This ensures cargo rebuilds when the chart template changes.

fn main() {
    println!("cargo:rerun-if-changed=resources/chart.html");
}
