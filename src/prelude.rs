pub use crate::dma::ControlChannel as _scope_acquisition_dma_ControlChannel;
pub use crate::dma::DmaChannel as _scope_acquisition_dma_DmaChannel;
pub use crate::dma::SampleChannel as _scope_acquisition_dma_SampleChannel;
pub use crate::mailbox::Fifo as _scope_acquisition_mailbox_Fifo;
pub use crate::mailbox::FifoExt as _scope_acquisition_mailbox_FifoExt;
pub use fugit::ExtU32 as _fugit_ExtU32;
pub use fugit::RateExtU32 as _fugit_RateExtU32;
