//! A [`Backend`] that records buffer traffic instead of talking to a GPU.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::gpu::{Backend, BufferUsage, DeviceBuffer};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BufferEvent {
    Created { id: u32, usage: BufferUsage, bytes: usize },
    Released { id: u32 },
}

#[derive(Debug)]
pub struct RecordedBuffer {
    pub id: u32,
    pub usage: BufferUsage,
    pub contents: Vec<u8>,
    log: Rc<RefCell<Vec<BufferEvent>>>,
}

impl DeviceBuffer for RecordedBuffer {
    fn release(&self) {
        self.log
            .borrow_mut()
            .push(BufferEvent::Released { id: self.id });
    }
}

#[derive(Default)]
pub struct RecordingBackend {
    log: Rc<RefCell<Vec<BufferEvent>>>,
    next_id: Cell<u32>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<BufferEvent> {
        self.log.borrow().clone()
    }

    /// Ids of buffers created but not yet released.
    pub fn live_buffers(&self) -> Vec<u32> {
        let events = self.log.borrow();
        events
            .iter()
            .filter_map(|event| match event {
                BufferEvent::Created { id, .. } => Some(*id),
                BufferEvent::Released { .. } => None,
            })
            .filter(|id| !events.contains(&BufferEvent::Released { id: *id }))
            .collect()
    }
}

impl Backend for RecordingBackend {
    type Buffer = RecordedBuffer;

    fn create_buffer(&self, _label: &str, contents: &[u8], usage: BufferUsage) -> RecordedBuffer {
        let id = self.next_id.get();
        self.next_id.set(id + 1);

        self.log.borrow_mut().push(BufferEvent::Created {
            id,
            usage,
            bytes: contents.len(),
        });

        RecordedBuffer {
            id,
            usage,
            contents: contents.to_vec(),
            log: Rc::clone(&self.log),
        }
    }
}
