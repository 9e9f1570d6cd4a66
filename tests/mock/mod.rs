use std::cell::{RefCell, RefMut};
use std::rc::Rc;

use mockall::automock;

#[automock]
pub trait Spy {
	fn trigger(&self, value: i32);
}

#[derive(Clone)]
pub struct SharedMock {
	mock: Rc<RefCell<MockSpy>>,
}

impl SharedMock {
	pub fn new() -> Self {
		SharedMock {
			mock: Rc::new(RefCell::new(MockSpy::new())),
		}
	}

	pub fn get(&self) -> RefMut<'_, MockSpy> {
		self.mock.borrow_mut()
	}
}
