//! micarray 板示例 - 外设 Hub 与中断核心
//!
//! 演示:
//! - 按板级设备表注册 micarray / ethernet / i2s / i2c / gpio 外设
//! - Hub 任务独占 DMA 引擎
//! - 每个核心一个中断许可调度根，回调在内核栈上运行
//!
//! DMA 引擎在这里是软件模拟的，真实驱动只需实现 `DmaEngine`。
//!
//! # 运行
//! ```bash
//! cargo run --example micarray_board --no-default-features --features esp32s3,dev --target xtensa-esp32s3-none-elf
//! ```

#![no_std]
#![no_main]

esp_bootloader_esp_idf::esp_app_desc!();

use esp_hal::interrupt::software::SoftwareInterruptControl;
use esp_hal::system::Stack;
use esp_hal::timer::timg::TimerGroup;
use esp_rtos::embassy::Executor;
use portable_atomic::{AtomicU32, Ordering};
use static_cell::StaticCell;

use soc_hub::interrupt::{isr_group_words, InterruptPermitted};
use soc_hub::soc::devices::{
    DeviceClass, DeviceSet, BOARD_DEVICE_COUNT, ETHERNET_DEVICE_COUNT, GPIO_DEVICE_COUNT,
    I2C_DEVICE_COUNT, I2S_DEVICE_COUNT, MICARRAY_DEVICE_COUNT,
};
use soc_hub::soc::{raise_irq, recv_command, send_reply};
use soc_hub::{
    rx_dma_ready, rx_dma_xfer, tx_dma_xfer, unmask_all, AppData, ChannelLink, ChannelRole,
    ChannelTriple, CoreId, DmaEngine, EngineBusy, HubConfig, IrqRouter, IrqStatus, IsrCallback,
    PeripheralHandle, PeripheralHub, PeripheralTable,
};

// ===== 条件编译日志 =====
#[cfg(feature = "dev")]
use esp_println::println;

#[cfg(not(feature = "dev"))]
macro_rules! println {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "log-defmt")]
use defmt_rtt as _;

// ===== Panic Handler =====
#[cfg(feature = "dev")]
use esp_backtrace as _;

#[cfg(not(feature = "dev"))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop { core::hint::spin_loop(); }
}

// ===== 静态分配 =====
static TABLE: PeripheralTable<BOARD_DEVICE_COUNT> = PeripheralTable::new();
static ROUTER: IrqRouter = IrqRouter::new();
static LINKS: [ChannelLink; BOARD_DEVICE_COUNT * 3] =
    [const { ChannelLink::new() }; BOARD_DEVICE_COUNT * 3];

static HUB: StaticCell<PeripheralHub<'static, BoardDma, BOARD_DEVICE_COUNT>> = StaticCell::new();
static EXECUTOR0: StaticCell<Executor> = StaticCell::new();
static EXECUTOR1: StaticCell<Executor> = StaticCell::new();
static CORE1_STACK: StaticCell<Stack<8192>> = StaticCell::new();

// ===== 中断回调 =====
static MIC_EVENTS: AtomicU32 = AtomicU32::new(0);
static ETH_EVENTS: AtomicU32 = AtomicU32::new(0);
static GPIO_EVENTS: AtomicU32 = AtomicU32::new(0);

/// 回调上下文: 只需要自己的句柄
struct DeviceContext {
    handle: PeripheralHandle,
}

static MIC_CTX: StaticCell<DeviceContext> = StaticCell::new();
static ETH_CTX: StaticCell<DeviceContext> = StaticCell::new();
static GPIO_CTX: StaticCell<[DeviceContext; GPIO_DEVICE_COUNT]> = StaticCell::new();

fn mic_isr(data: AppData) {
    let ctx = unsafe { data.as_static::<DeviceContext>() };
    if TABLE.interrupt_status(ctx.handle).contains(IrqStatus::DMA_RX_DONE) {
        MIC_EVENTS.fetch_add(1, Ordering::Relaxed);
    }
}

fn eth_isr(data: AppData) {
    let ctx = unsafe { data.as_static::<DeviceContext>() };
    if TABLE.interrupt_status(ctx.handle).contains(IrqStatus::DMA_TX_DONE) {
        ETH_EVENTS.fetch_add(1, Ordering::Relaxed);
    }
}

fn gpio_isr(data: AppData) {
    let ctx = unsafe { data.as_static::<DeviceContext>() };
    let status = TABLE.interrupt_status(ctx.handle);
    GPIO_EVENTS.fetch_add(status.device_bits().count_ones(), Ordering::Relaxed);
}

const MIC_ISR: IsrCallback = IsrCallback::new("mic_isr", mic_isr, 128);
const ETH_ISR: IsrCallback = IsrCallback::new("eth_isr", eth_isr, 128);
const GPIO_ISR: IsrCallback = IsrCallback::new("gpio_isr", gpio_isr, 96);

/// 两个核心共用同一组回调的栈尺寸
const KSTACK_WORDS: usize = isr_group_words(&[MIC_ISR, ETH_ISR, GPIO_ISR]);

static ROOT1: StaticCell<InterruptPermitted<fn() -> !, KSTACK_WORDS>> = StaticCell::new();

// ===== 软件 DMA 引擎 =====

/// 模拟 DMA: 接收端产生递增的 PCM 样本，发送端只计数
struct BoardDma {
    sample: u8,
    sent: u32,
}

impl DmaEngine for BoardDma {
    fn receive(&mut self, _handle: PeripheralHandle, buf: &mut [u8]) -> usize {
        for byte in buf.iter_mut() {
            *byte = self.sample;
            self.sample = self.sample.wrapping_add(1);
        }
        buf.len()
    }

    fn transmit(&mut self, _handle: PeripheralHandle, data: &[u8]) -> Result<(), EngineBusy> {
        self.sent = self.sent.wrapping_add(data.len() as u32);
        Ok(())
    }
}

// ===== 任务 =====

#[embassy_executor::task]
async fn hub_task(hub: &'static mut PeripheralHub<'static, BoardDma, BOARD_DEVICE_COUNT>) {
    soc_hub::hub(hub).await
}

/// 中断服务: 在所属核心上投递挂起的回调
#[embassy_executor::task(pool_size = 2)]
async fn irq_service_task(core: CoreId) {
    unmask_all();
    loop {
        ROUTER.wait(core).await;
        ROUTER.service(core, &TABLE);
    }
}

#[embassy_executor::task]
async fn mic_task(handle: PeripheralHandle) {
    let rx = TABLE.chanend(handle, ChannelRole::FromDma);
    let mut pcm = [0u8; 256];
    let mut total = 0usize;
    loop {
        rx_dma_ready(&rx).await;
        match rx_dma_xfer(&rx, &mut pcm, pcm.len()).await {
            Ok(n) => total += n,
            Err(e) => println!("mic rx failed: {}", e),
        }
        if total >= 64 * 1024 {
            println!("mic: {} bytes, {} irqs", total, MIC_EVENTS.load(Ordering::Relaxed));
            total = 0;
        }
    }
}

#[embassy_executor::task]
async fn ethernet_task(handle: PeripheralHandle) {
    let tx = TABLE.chanend(handle, ChannelRole::ToDma);
    let frame = [0x55u8; 128];
    let mut frames = 0u32;
    loop {
        match tx_dma_xfer(&tx, &frame, frame.len()).await {
            Ok(()) => frames = frames.wrapping_add(1),
            Err(e) => println!("ethernet tx failed: {}", e),
        }
        if frames % 1024 == 0 {
            println!("ethernet: {} frames, {} irqs", frames, ETH_EVENTS.load(Ordering::Relaxed));
        }
    }
}

/// gpio 外设: 收到命令后上报一个设备自定义中断位并应答
#[embassy_executor::task(pool_size = 2)]
async fn gpio_device_task(handle: PeripheralHandle) {
    let ctrl = TABLE.chanend(handle, ChannelRole::Control);
    loop {
        match recv_command(&ctrl).await {
            Ok(pin) => {
                raise_irq(&ctrl, IrqStatus::from_bits_retain(1 << (8 + (pin & 0xF)))).await;
                send_reply(&ctrl, pin).await;
            }
            Err(e) => println!("gpio control failed: {}", e),
        }
    }
}

#[embassy_executor::task]
async fn gpio_app_task(handle: PeripheralHandle) {
    let ctrl = TABLE.ctrl_chanend(handle);
    let mut pin = 0u32;
    loop {
        match ctrl.transact(pin).await {
            Ok(echoed) if echoed != pin => println!("gpio echo mismatch: {} != {}", echoed, pin),
            Ok(_) => {}
            Err(e) => println!("gpio control reset: {}", e),
        }
        pin = (pin + 1) & 0xF;
    }
}

// ===== 调度根 =====

fn core1_main() -> ! {
    let executor = EXECUTOR1.init(Executor::new());
    executor.run(|spawner| {
        spawner.must_spawn(irq_service_task(CoreId::CORE1));
    })
}

fn triple(index: usize) -> ChannelTriple {
    ChannelTriple::new(&LINKS[3 * index], &LINKS[3 * index + 1], &LINKS[3 * index + 2])
}

#[esp_hal::main]
fn main() -> ! {
    let peripherals = esp_hal::init(esp_hal::Config::default());

    println!("micarray board");
    println!("==============");
    println!("devices: {}, kernel stack: {} words", BOARD_DEVICE_COUNT, KSTACK_WORDS);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let sw_ints = SoftwareInterruptControl::new(peripherals.SW_INTERRUPT);
    esp_rtos::start(timg0.timer0, sw_ints.software_interrupt0);

    // ===== 按板级设备表注册 =====
    let mut micarray = DeviceSet::<MICARRAY_DEVICE_COUNT>::new(DeviceClass::MicArray);
    let mut ethernet = DeviceSet::<ETHERNET_DEVICE_COUNT>::new(DeviceClass::Ethernet);
    let mut i2s = DeviceSet::<I2S_DEVICE_COUNT>::new(DeviceClass::I2s);
    let mut i2c = DeviceSet::<I2C_DEVICE_COUNT>::new(DeviceClass::I2c);
    let mut gpio = DeviceSet::<GPIO_DEVICE_COUNT>::new(DeviceClass::Gpio);

    let all_ok = micarray.register(&TABLE, triple(0)).is_ok()
        && ethernet.register(&TABLE, triple(1)).is_ok()
        && i2s.register(&TABLE, triple(2)).is_ok()
        && i2c.register(&TABLE, triple(3)).is_ok()
        && gpio.register(&TABLE, triple(4)).is_ok()
        && gpio.register(&TABLE, triple(5)).is_ok();
    if !all_ok {
        panic!("board device registration failed");
    }
    println!("{} peripherals registered", TABLE.len());

    // micarray 与 ethernet 回调在 Core0，gpio 回调在 Core1。
    // 外设在 handler_register 之前发起传输会被 Hub 视为协议违规
    let devices = (micarray.get(0), ethernet.get(0), gpio.get(0), gpio.get(1));
    let (Some(mic), Some(eth), Some(gpio_a), Some(gpio_b)) = devices else {
        panic!("board device table incomplete");
    };
    let mic_ctx = MIC_CTX.init(DeviceContext { handle: mic });
    TABLE.handler_register(mic, CoreId::CORE0, AppData::from_static(mic_ctx), MIC_ISR);
    let eth_ctx = ETH_CTX.init(DeviceContext { handle: eth });
    TABLE.handler_register(eth, CoreId::CORE0, AppData::from_static(eth_ctx), ETH_ISR);

    let gpio_ctx: &'static [DeviceContext; GPIO_DEVICE_COUNT] = GPIO_CTX.init([
        DeviceContext { handle: gpio_a },
        DeviceContext { handle: gpio_b },
    ]);
    for ctx in gpio_ctx.iter() {
        TABLE.handler_register(ctx.handle, CoreId::CORE1, AppData::from_static(ctx), GPIO_ISR);
    }

    // ===== Core1 =====
    let stack = CORE1_STACK.init(Stack::new());
    esp_rtos::start_second_core(peripherals.CPU_CTRL, sw_ints.software_interrupt1, stack, move || {
        let root = ROOT1.init(InterruptPermitted::new(core1_main as fn() -> !));
        root.call_interrupt_permitted()
    });

    // ===== Core0: Hub 与外设任务 =====
    // main 永不返回，调度根与其内核栈留在 main 的栈上
    let mut root = InterruptPermitted::<_, KSTACK_WORDS>::new(move || -> ! {
        let hub = HUB.init(PeripheralHub::new(
            &TABLE,
            &ROUTER,
            BoardDma { sample: 0, sent: 0 },
            HubConfig::default(),
        ));
        let executor = EXECUTOR0.init(Executor::new());
        executor.run(move |spawner| {
            spawner.must_spawn(irq_service_task(CoreId::CORE0));
            spawner.must_spawn(hub_task(hub));
            spawner.must_spawn(mic_task(mic));
            spawner.must_spawn(ethernet_task(eth));
            spawner.must_spawn(gpio_device_task(gpio_a));
            spawner.must_spawn(gpio_device_task(gpio_b));
            spawner.must_spawn(gpio_app_task(gpio_a));
        })
    });
    root.call_interrupt_permitted()
}
