use harvestq_core::RandomSource;

pub fn run() {
    println!("{:<4} {:<14} {:>6}", "Tag", "Source", "Pure");
    println!("{}", "-".repeat(26));
    for src in RandomSource::ALL {
        let pure = if src.is_pure() { "yes" } else { "" };
        println!("{:<4} {:<14} {:>6}", src.index(), src.name(), pure);
    }
}
