pub mod book;
pub mod cart;
pub mod cart_item;
pub mod library_entry;
pub mod order;
pub mod order_item;
pub mod user;
pub mod webhook_event;

pub use book::Entity as Book;
pub use cart::Entity as Cart;
pub use cart_item::Entity as CartItem;
pub use library_entry::Entity as LibraryEntry;
pub use order::Entity as Order;
pub use order_item::Entity as OrderItem;
pub use user::Entity as User;
pub use webhook_event::Entity as WebhookEvent;

pub use book::Model as BookModel;
pub use cart::Model as CartModel;
pub use cart_item::Model as CartItemModel;
pub use library_entry::Model as LibraryEntryModel;
pub use order::Model as OrderModel;
pub use order_item::Model as OrderItemModel;
pub use user::Model as UserModel;
