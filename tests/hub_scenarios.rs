//! Hub 端到端场景
//!
//! 多数测试里外设与 Hub 用 `join` 在同一线程上交替推进，中断回调经由
//! 中断许可作用域在内核栈上执行。`hub_and_peripherals_on_separate_threads`
//! 让 Hub 与收发两端各占一个线程。

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use embassy_futures::block_on;
use embassy_futures::join::join;

use soc_hub::interrupt::{isr_group_words, InterruptPermitted};
use soc_hub::soc::devices::{DeviceClass, DeviceSet, GPIO_DEVICE_COUNT};
use soc_hub::soc::hub::Source;
use soc_hub::{
    mask_all, rx_dma_ready, rx_dma_xfer, tx_dma_xfer, unmask_all, AppData, ChannelLink, ChannelRole,
    ChannelTriple, CoreId, DmaEngine, EngineBusy, HubConfig, IrqRouter, IrqStatus, IsrCallback,
    PeripheralHandle, PeripheralHub, PeripheralTable, RegisterError, XferError,
};

const SLOTS: usize = 2;

#[derive(Default)]
struct FakeEngine {
    pending: Vec<u8>,
    sent: Vec<Vec<u8>>,
}

impl FakeEngine {
    fn with_pending(data: &[u8]) -> Self {
        Self {
            pending: data.to_vec(),
            sent: Vec::new(),
        }
    }
}

impl DmaEngine for FakeEngine {
    fn receive(&mut self, _: PeripheralHandle, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        n
    }

    fn transmit(&mut self, _: PeripheralHandle, data: &[u8]) -> Result<(), EngineBusy> {
        self.sent.push(data.to_vec());
        Ok(())
    }
}

fn leak<T>(value: T) -> &'static T {
    Box::leak(Box::new(value))
}

fn new_triple() -> ChannelTriple {
    let links: &'static [ChannelLink; 3] = leak([const { ChannelLink::new() }; 3]);
    ChannelTriple::new(&links[0], &links[1], &links[2])
}

/// 中断回调的应用上下文
struct IrqContext {
    table: &'static PeripheralTable<SLOTS>,
    handle: PeripheralHandle,
    seen: AtomicU32,
    calls: AtomicU32,
    sp: AtomicUsize,
}

fn on_irq(data: AppData) {
    let ctx = unsafe { data.as_static::<IrqContext>() };
    let marker = 0u8;
    ctx.sp.store(&marker as *const u8 as usize, Ordering::SeqCst);
    let status = ctx.table.interrupt_status(ctx.handle);
    ctx.seen.fetch_or(status.bits(), Ordering::SeqCst);
    ctx.calls.fetch_add(1, Ordering::SeqCst);
}

const ON_IRQ: IsrCallback = IsrCallback::new("on_irq", on_irq, 2048);
const KSTACK_WORDS: usize = isr_group_words(&[ON_IRQ]);

struct Fixture {
    table: &'static PeripheralTable<SLOTS>,
    router: &'static IrqRouter,
    handle: PeripheralHandle,
    ctx: &'static IrqContext,
}

fn fixture(core: CoreId) -> Fixture {
    let table = leak(PeripheralTable::<SLOTS>::new());
    let router = leak(IrqRouter::new());
    let handle = table.register(new_triple()).unwrap();
    let ctx = leak(IrqContext {
        table,
        handle,
        seen: AtomicU32::new(0),
        calls: AtomicU32::new(0),
        sp: AtomicUsize::new(0),
    });
    table.handler_register(handle, core, AppData::from_static(ctx), ON_IRQ);
    Fixture {
        table,
        router,
        handle,
        ctx,
    }
}

#[test]
fn rx_of_ten_bytes_raises_only_the_receive_bit() {
    let f = fixture(CoreId::CORE0);
    let payload: Vec<u8> = (1..=10).collect();
    let engine = FakeEngine::with_pending(&payload);
    let mut hub = PeripheralHub::new(f.table, f.router, engine, HubConfig::default());

    let rx = f.table.chanend(f.handle, ChannelRole::FromDma);
    let mut buf = [0u8; 64];
    let (received, _) = block_on(join(
        async {
            rx_dma_ready(&rx).await;
            rx_dma_xfer(&rx, &mut buf, 64).await
        },
        async {
            hub.service_once().await;
            hub.service_once().await;
        },
    ));
    assert_eq!(received, Ok(10));
    assert_eq!(&buf[..10], payload.as_slice());
    assert_eq!(f.router.pending(CoreId::CORE0), 1 << f.handle.index());

    // 在中断许可作用域内投递
    let mut root = InterruptPermitted::<_, KSTACK_WORDS>::new(|| {
        unmask_all();
        let delivered = f.router.service(CoreId::CORE0, f.table);
        let _ = mask_all().into_mask();
        delivered
    });
    assert_eq!(root.call_interrupt_permitted(), 1);

    let seen = IrqStatus::from_bits_retain(f.ctx.seen.load(Ordering::SeqCst));
    assert!(seen.contains(IrqStatus::DMA_RX_DONE));
    assert!(!seen.contains(IrqStatus::DMA_TX_DONE));
    assert_eq!(f.ctx.calls.load(Ordering::SeqCst), 1);
    assert_eq!(f.router.pending(CoreId::CORE0), 0);
    assert!(f.table.interrupt_status(f.handle).is_empty());

    #[cfg(all(any(target_arch = "x86_64", target_arch = "aarch64"), not(windows)))]
    {
        let stack = root.kernel_stack().stack_ref();
        let top = stack.top.as_ptr() as usize;
        let bottom = top - stack.words * core::mem::size_of::<usize>();
        let sp = f.ctx.sp.load(Ordering::SeqCst);
        assert!(sp >= bottom && sp < top, "callback did not run on the kernel stack");
    }
}

#[test]
fn rx_never_writes_past_max_length() {
    let f = fixture(CoreId::CORE0);
    let engine = FakeEngine::with_pending(&[7; 10]);
    let mut hub = PeripheralHub::new(f.table, f.router, engine, HubConfig::default());
    let rx = f.table.chanend(f.handle, ChannelRole::FromDma);

    let mut lengths = Vec::new();
    for max in [0usize, 4, 4, 4, 4] {
        let mut buf = [0xEEu8; 16];
        let (n, _) = block_on(join(
            async {
                rx_dma_ready(&rx).await;
                rx_dma_xfer(&rx, &mut buf, max).await
            },
            async {
                hub.service_once().await;
                hub.service_once().await;
            },
        ));
        let n = n.unwrap();
        assert!(n <= max);
        assert!(buf[n..].iter().all(|&b| b == 0xEE));
        lengths.push(n);
    }
    // 截断后剩余数据留给后续调用，耗尽后返回 0
    assert_eq!(lengths, [0, 4, 4, 2, 0]);
    assert_eq!(hub.stats().rx_bytes(), 10);
}

#[test]
fn zero_length_tx_completes_the_handshake() {
    let f = fixture(CoreId::CORE0);
    let engine = FakeEngine::default();
    let mut hub = PeripheralHub::new(f.table, f.router, engine, HubConfig::default());
    let tx = f.table.chanend(f.handle, ChannelRole::ToDma);

    let (result, source) = block_on(join(tx_dma_xfer(&tx, &[], 0), hub.service_once()));
    assert_eq!(result, Ok(()));
    assert_eq!(
        source,
        Source::Channel {
            slot: f.handle.index(),
            role: ChannelRole::ToDma
        }
    );
    assert!(hub.engine().sent.is_empty());
    assert_eq!(f.router.pending(CoreId::CORE0), 0);
    assert!(f.table.interrupt_status(f.handle).is_empty());
}

#[test]
fn tx_reaches_engine_and_raises_transmit_bit() {
    let f = fixture(CoreId::CORE1);
    let engine = FakeEngine::default();
    let mut hub = PeripheralHub::new(f.table, f.router, engine, HubConfig::default());
    let tx = f.table.chanend(f.handle, ChannelRole::ToDma);

    let (result, _) = block_on(join(tx_dma_xfer(&tx, b"hello", 5), hub.service_once()));
    assert_eq!(result, Ok(()));
    assert_eq!(hub.engine().sent, [b"hello".to_vec()]);
    assert!(f.table.tx_dma_ring_buf(f.handle).is_empty());

    // 回调绑定在 Core1
    assert_eq!(f.router.pending(CoreId::CORE0), 0);
    assert_ne!(f.router.pending(CoreId::CORE1), 0);
    assert_eq!(f.table.interrupt_status(f.handle), IrqStatus::DMA_TX_DONE);
}

#[test]
fn oversized_tx_is_rejected_before_the_handshake() {
    let f = fixture(CoreId::CORE0);
    let tx = f.table.chanend(f.handle, ChannelRole::ToDma);
    let big = [0u8; soc_hub::config::DMA_FRAME_SIZE + 1];
    let result = block_on(tx_dma_xfer(&tx, &big, big.len()));
    assert_eq!(
        result,
        Err(XferError::FrameTooLarge {
            len: big.len(),
            max: soc_hub::config::DMA_FRAME_SIZE
        })
    );
}

#[test]
fn rx_without_ready_resets_only_that_session() {
    let f = fixture(CoreId::CORE0);
    let engine = FakeEngine::with_pending(&[1; 4]);
    let mut hub = PeripheralHub::new(f.table, f.router, engine, HubConfig::default());
    let rx = f.table.chanend(f.handle, ChannelRole::FromDma);

    let mut buf = [0u8; 8];
    let (result, _) = block_on(join(rx_dma_xfer(&rx, &mut buf, 8), hub.service_once()));
    assert_eq!(result, Err(XferError::SessionReset));
    assert_eq!(hub.stats().faults(), 1);

    // 复位后会话可继续使用
    let (result, _) = block_on(join(
        async {
            rx_dma_ready(&rx).await;
            rx_dma_xfer(&rx, &mut buf, 8).await
        },
        async {
            hub.service_once().await;
            hub.service_once().await;
        },
    ));
    assert_eq!(result, Ok(4));
}

#[test]
fn third_gpio_device_exhausts_the_table() {
    let table = PeripheralTable::<GPIO_DEVICE_COUNT>::new();
    let mut gpio = DeviceSet::<GPIO_DEVICE_COUNT>::new(DeviceClass::Gpio);

    gpio.register(&table, new_triple()).unwrap();
    gpio.register(&table, new_triple()).unwrap();
    assert_eq!(
        table.register(new_triple()),
        Err(RegisterError::TableFull {
            capacity: GPIO_DEVICE_COUNT
        })
    );
    assert_eq!(gpio.len(), 2);
}

#[test]
fn handles_are_distinct_and_lookups_stable() {
    let table = PeripheralTable::<SLOTS>::new();
    let a_links = new_triple();
    let a = table.register(a_links).unwrap();
    let b = table.register(new_triple()).unwrap();
    assert_ne!(a, b);

    for _ in 0..3 {
        assert!(core::ptr::eq(table.ctrl_chanend(a).link(), a_links.control));
        assert!(core::ptr::eq(table.rx_dma_ring_buf(a), table.rx_dma_ring_buf(a)));
        assert!(core::ptr::eq(table.tx_dma_ring_buf(a), table.tx_dma_ring_buf(a)));
    }
    assert!(!core::ptr::eq(table.rx_dma_ring_buf(a), table.rx_dma_ring_buf(b)));
}

#[test]
fn rx_before_handler_register_is_refused() {
    let table = leak(PeripheralTable::<SLOTS>::new());
    let router = leak(IrqRouter::new());
    let handle = table.register(new_triple()).unwrap();
    let engine = FakeEngine::with_pending(&[3; 3]);
    let mut hub = PeripheralHub::new(table, router, engine, HubConfig::default());
    let rx = table.chanend(handle, ChannelRole::FromDma);

    let mut buf = [0u8; 8];
    let (result, _) = block_on(join(
        async {
            rx_dma_ready(&rx).await;
            rx_dma_xfer(&rx, &mut buf, 8).await
        },
        async {
            hub.service_once().await;
            hub.service_once().await;
        },
    ));
    assert_eq!(result, Err(XferError::SessionReset));
    assert_eq!(hub.stats().faults(), 1);
    assert_eq!(hub.engine().pending.len(), 3);
    assert!(table.rx_dma_ring_buf(handle).is_empty());
    assert_eq!(router.pending(CoreId::CORE0), 0);
    assert!(table.interrupt_status(handle).is_empty());
}

#[test]
fn control_commands_bypass_the_hub() {
    let f = fixture(CoreId::CORE0);
    let ctrl = f.table.ctrl_chanend(f.handle);
    let dev = f.table.chanend(f.handle, ChannelRole::Control);
    let engine = FakeEngine::default();
    let mut hub = PeripheralHub::new(f.table, f.router, engine, HubConfig::default());

    let (answer, _) = block_on(join(ctrl.transact(0x10), async {
        let cmd = soc_hub::soc::recv_command(&dev).await.unwrap();
        soc_hub::soc::send_reply(&dev, cmd + 1).await;
        hub.service_once().await;
    }));
    assert_eq!(answer, Ok(0x11));
}

/// 接收端产生连续递增的字节，发送端只计数
#[derive(Default)]
struct StreamEngine {
    next: u8,
    sent: usize,
}

impl DmaEngine for StreamEngine {
    fn receive(&mut self, _: PeripheralHandle, buf: &mut [u8]) -> usize {
        for byte in buf.iter_mut() {
            *byte = self.next;
            self.next = self.next.wrapping_add(1);
        }
        buf.len()
    }

    fn transmit(&mut self, _: PeripheralHandle, data: &[u8]) -> Result<(), EngineBusy> {
        self.sent += data.len();
        Ok(())
    }
}

#[test]
fn hub_and_peripherals_on_separate_threads() {
    const ROUNDS: usize = 2000;
    const RX_LEN: usize = 32;
    const TX_LEN: usize = 16;

    let f = fixture(CoreId::CORE0);
    let (table, handle) = (f.table, f.handle);
    let engine = StreamEngine::default();
    let mut hub = PeripheralHub::new(table, f.router, engine, HubConfig::default());

    // 每轮接收两个源 (ready + xfer)，发送一个源
    let hub_thread = std::thread::spawn(move || {
        for _ in 0..ROUNDS * 3 {
            block_on(hub.service_once());
        }
        hub
    });
    let rx_thread = std::thread::spawn(move || {
        let rx = table.chanend(handle, ChannelRole::FromDma);
        let mut expected = 0u8;
        let mut total = 0;
        for _ in 0..ROUNDS {
            let mut buf = [0u8; RX_LEN];
            let n = block_on(async {
                rx_dma_ready(&rx).await;
                rx_dma_xfer(&rx, &mut buf, RX_LEN).await
            })
            .unwrap();
            for &byte in &buf[..n] {
                assert_eq!(byte, expected);
                expected = expected.wrapping_add(1);
            }
            total += n;
        }
        total
    });
    let tx_thread = std::thread::spawn(move || {
        let tx = table.chanend(handle, ChannelRole::ToDma);
        let frame = [0x5Au8; TX_LEN];
        for _ in 0..ROUNDS {
            block_on(tx_dma_xfer(&tx, &frame, TX_LEN)).unwrap();
        }
    });

    assert_eq!(rx_thread.join().unwrap(), ROUNDS * RX_LEN);
    tx_thread.join().unwrap();
    let hub = hub_thread.join().unwrap();

    assert_eq!(hub.engine().sent, ROUNDS * TX_LEN);
    assert_eq!(hub.stats().rx_bytes(), (ROUNDS * RX_LEN) as u64);
    assert_eq!(hub.stats().tx_bytes(), (ROUNDS * TX_LEN) as u64);
    assert_eq!(hub.stats().faults(), 0);
    assert!(table.tx_dma_ring_buf(handle).is_empty());
    assert_eq!(table.interrupt_status(handle), IrqStatus::DMA_RX_DONE | IrqStatus::DMA_TX_DONE);
}
