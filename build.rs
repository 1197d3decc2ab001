use std::env;

fn main() {
    // 内核栈下限 (字)，对应板级配置中的 KSTACK_WORDS
    // 未设置时为 0，由回调组自行决定栈大小
    let kstack_words = env::var("SOC_HUB_KSTACK_WORDS")
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    println!("cargo:rustc-env=SOC_HUB_KSTACK_WORDS={}", kstack_words);

    println!("cargo:rerun-if-env-changed=SOC_HUB_KSTACK_WORDS");
    println!("cargo:rerun-if-changed=build.rs");
}
