use gpu_accel::GpuModule;

pub fn run() -> anyhow::Result<()> {
    let adapters = GpuModule::enumerate_adapters();

    println!("Number of compute adapters: {}", adapters.len());

    for (index, adapter) in adapters.iter().enumerate() {
        println!("Adapter #{}/{} (--device {})", index + 1, adapters.len(), index);
        println!("{}", adapter);
    }

    if adapters.is_empty() {
        tracing::warn!("No compute adapters found; GPU benchmarks will fail");
    }

    Ok(())
}
